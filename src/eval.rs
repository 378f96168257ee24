//! GSM8K answer-accuracy evaluation.
//!
//! Each test question is turned into a two-line prompt, the model's
//! continuation is decoded, and the last number in it is compared with the
//! number after `####` in the reference answer.

use std::sync::LazyLock;

use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use serde::Serialize;

use crate::error::Result;
use crate::raw::RawExample;

/// Reference answers end with `#### <number>`.
static ANSWER_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"####\s*(-?[\d,]+(?:\.\d+)?)").expect("Invalid answer number regex")
});

static ANY_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?[\d,]+(?:\.\d+)?").expect("Invalid number regex"));

/// Produces a continuation for a prompt.
pub trait Generate {
    /// Generate at most `max_new_tokens` tokens after `prompt` and return only
    /// the new text.
    fn generate(&mut self, prompt: &str, max_new_tokens: usize) -> Result<String>;
}

/// Prompt used for every question.
///
/// ```rust
/// assert_eq!(mlora_prep::eval::build_prompt("2+2?"), "Question: 2+2?\nAnswer:");
/// ```
#[must_use]
pub fn build_prompt(question: &str) -> String {
    format!("Question: {question}\nAnswer:")
}

/// Number following `####` in a reference answer, commas removed.
///
/// ```rust
/// use mlora_prep::eval::extract_answer_number;
///
/// assert_eq!(extract_answer_number("so 1000 + 234 = 1,234\n#### 1,234").as_deref(), Some("1234"));
/// assert_eq!(extract_answer_number("no marker 12"), None);
/// ```
#[must_use]
pub fn extract_answer_number(text: &str) -> Option<String> {
    let captures = ANSWER_NUMBER.captures(text)?;
    non_empty(captures[1].replace(',', ""))
}

/// Last number in model output, commas removed.
///
/// ```rust
/// use mlora_prep::eval::extract_model_number;
///
/// assert_eq!(extract_model_number("3 apples, so the total is 42 dollars").as_deref(), Some("42"));
/// assert_eq!(extract_model_number("I do not know"), None);
/// ```
#[must_use]
pub fn extract_model_number(text: &str) -> Option<String> {
    let last = ANY_NUMBER.find_iter(text).last()?;
    non_empty(last.as_str().replace(',', ""))
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Compare a prediction with a reference numerically.
///
/// A missing or unparsable prediction is wrong.
#[must_use]
pub fn is_correct(prediction: Option<&str>, reference: f64) -> bool {
    prediction
        .and_then(|p| p.parse::<f64>().ok())
        .is_some_and(|p| p == reference)
}

/// Scored result of one question.
#[derive(Debug, Clone, Serialize)]
pub struct EvalItem {
    /// Position in the test split.
    pub index: usize,
    /// Reference number.
    pub reference: String,
    /// Extracted prediction, if any.
    pub prediction: Option<String>,
    /// Whether the prediction matched.
    pub correct: bool,
}

/// Accuracy summary over a split.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvalSummary {
    /// Questions answered correctly.
    pub correct: usize,
    /// Questions answered wrongly.
    pub incorrect: usize,
    /// Questions with a parsable reference.
    pub attempted: usize,
    /// Questions skipped because the reference had no number.
    pub skipped: usize,
    /// `correct / attempted` in percent, 0 when nothing was attempted.
    pub accuracy: f64,
    /// Per-question results.
    pub items: Vec<EvalItem>,
}

impl EvalSummary {
    fn record(&mut self, item: EvalItem) {
        self.attempted += 1;
        if item.correct {
            self.correct += 1;
        } else {
            self.incorrect += 1;
        }
        self.items.push(item);
    }

    fn finish(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let accuracy = if self.attempted > 0 {
            self.correct as f64 / self.attempted as f64 * 100.0
        } else {
            0.0
        };
        self.accuracy = accuracy;
    }

    /// Report block as printed by the CLI.
    #[must_use]
    pub fn report(&self) -> String {
        let rule = "=".repeat(30);
        format!(
            "{rule}\nBaseline evaluation\nCorrect: {}\nIncorrect: {}\nAccuracy: {:.2}%\n{rule}",
            self.correct, self.incorrect, self.accuracy
        )
    }

    /// Write the summary as pretty JSON.
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Run every example through `generator` and score the answers.
pub fn evaluate<G: Generate + ?Sized>(
    generator: &mut G,
    examples: &[RawExample],
    max_new_tokens: usize,
    show_progress: bool,
) -> Result<EvalSummary> {
    let pb = if show_progress {
        let pb = ProgressBar::new(examples.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>5}/{len:5} {msg}")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut summary = EvalSummary::default();
    for (index, example) in examples.iter().enumerate() {
        pb.inc(1);

        let Some(reference) = extract_answer_number(&example.text("answer")) else {
            tracing::debug!("Skipping question {index}: reference has no number");
            summary.skipped += 1;
            continue;
        };
        let Ok(reference_value) = reference.parse::<f64>() else {
            tracing::debug!("Skipping question {index}: reference {reference} is not numeric");
            summary.skipped += 1;
            continue;
        };

        let prompt = build_prompt(&example.text("question"));
        let output = generator.generate(&prompt, max_new_tokens)?;
        let prediction = extract_model_number(&output);
        let correct = is_correct(prediction.as_deref(), reference_value);
        tracing::trace!(index, ?prediction, %reference, correct, "scored");

        summary.record(EvalItem {
            index,
            reference,
            prediction,
            correct,
        });
        pb.set_message(format!("acc {}/{}", summary.correct, summary.attempted));
    }
    pb.finish_and_clear();

    summary.finish();
    Ok(summary)
}
