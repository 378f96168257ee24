//! Token-length statistics over record files.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;

use crate::error::{PrepError, Result};

/// Anything that can count the tokens of a text.
pub trait TokenCount {
    /// Number of tokens in `text`, special tokens included.
    fn count_tokens(&self, text: &str) -> Result<usize>;
}

impl TokenCount for tokenizers::Tokenizer {
    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.encode(text, true)?.len())
    }
}

/// Aggregated token counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenStats {
    /// Records measured.
    pub total_samples: usize,
    /// Mean tokens per record.
    pub mean_tokens: f64,
    /// Longest record, in tokens.
    pub max_tokens: usize,
}

impl TokenStats {
    /// Report lines as printed by the CLI.
    #[must_use]
    pub fn report(&self) -> String {
        format!(
            "Total Samples: {}\nAverage Length: {:.2} tokens\nMax Length:     {} tokens",
            self.total_samples, self.mean_tokens, self.max_tokens
        )
    }
}

/// Concatenate every field value of a record, each followed by one space.
///
/// Strings are taken verbatim; other values use their JSON text.
///
/// ```rust
/// use mlora_prep::stats::record_text;
///
/// let record = serde_json::json!({"instruction": "Add", "input": "", "n": 2});
/// assert_eq!(record_text(&record), "Add  2 ");
/// ```
#[must_use]
pub fn record_text(record: &Value) -> String {
    let mut text = String::new();
    let mut push = |value: &Value| {
        match value {
            Value::String(s) => text.push_str(s),
            other => text.push_str(&other.to_string()),
        }
        text.push(' ');
    };

    match record {
        Value::Object(fields) => fields.values().for_each(&mut push),
        other => push(other),
    }
    text
}

/// Count tokens of every record and aggregate.
pub fn compute<T: TokenCount + ?Sized>(
    counter: &T,
    records: &[Value],
    show_progress: bool,
) -> Result<TokenStats> {
    if records.is_empty() {
        return Err(PrepError::Dataset("no records to measure".into()));
    }

    let pb = if show_progress {
        let pb = ProgressBar::new(records.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>7}/{len:7} {msg}")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut total = 0usize;
    let mut max_tokens = 0usize;
    for record in records {
        let count = counter.count_tokens(&record_text(record))?;
        total += count;
        max_tokens = max_tokens.max(count);
        pb.inc(1);
    }
    pb.finish_and_clear();

    #[allow(clippy::cast_precision_loss)]
    let mean_tokens = total as f64 / records.len() as f64;

    Ok(TokenStats {
        total_samples: records.len(),
        mean_tokens,
        max_tokens,
    })
}
