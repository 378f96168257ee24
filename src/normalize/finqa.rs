//! FinQA financial question answering.
//!
//! Every question is rendered with its textual context and table, preceded by
//! a fixed block of few-shot demonstrations built from the first rows of the
//! same split. Gold evidence sentences are turned into numbered reasoning
//! steps. The conversion is a best-effort formatter; it makes no attempt to
//! parse the evidence grammar.

use super::{flatten_messages, DatasetKind, Normalizer};
use crate::raw::RawExample;
use crate::record::Record;

const SYSTEM_PROMPT: &str = concat!(
    "Below is an instruction that describes a task, paired with an input that provides further context. ",
    "Write a response that appropriately completes the request.\n\n",
    "You are given a financial question along with surrounding textual evidence and a table excerpt. ",
    "You should provide a succinct step-by-step reasoning showing how you extract relevant information ",
    "from the context and perform calculations to arrive at the answer.",
    "The output length should be less than 256 tokens.",
    "Then provide the final answer in the exact format '#### <answer>'. ",
);

/// Lines kept in each few-shot context section.
const FEW_SHOT_CONTEXT_LINES: usize = 10;

/// Render a table as pipe-separated rows with a `---` separator under the header.
///
/// ```rust
/// use mlora_prep::normalize::format_table;
///
/// let table = vec![
///     vec!["year".to_string(), "revenue".to_string()],
///     vec!["2019".to_string(), "$ 12".to_string()],
/// ];
/// assert_eq!(format_table(&table), "year | revenue\n--- | ---\n2019 | $ 12");
/// assert_eq!(format_table(&[]), "");
/// ```
#[must_use]
pub fn format_table(table: &[Vec<String>]) -> String {
    let Some(header) = table.first() else {
        return String::new();
    };

    let separator = vec!["---"; header.len()].join(" | ");
    let mut lines = Vec::with_capacity(table.len() + 1);
    lines.push(header.join(" | "));
    lines.push(separator);
    lines.extend(table[1..].iter().map(|row| row.join(" | ")));
    lines.join("\n")
}

/// Turn gold evidence sentences into numbered reasoning steps.
///
/// ```rust
/// use mlora_prep::normalize::convert_gold_inds_to_reasoning;
///
/// let steps = convert_gold_inds_to_reasoning(&[
///     "the revenue of the company is $ 10 ;".to_string(),
/// ]);
/// assert_eq!(steps, "Step 1: From the data, revenue for the company is $ 10.");
/// ```
#[must_use]
pub fn convert_gold_inds_to_reasoning(gold_inds: &[String]) -> String {
    let mut steps = Vec::new();

    for evidence in gold_inds {
        let evidence = evidence.trim();
        let evidence = evidence.strip_suffix(';').unwrap_or(evidence);
        let facts = evidence.split(';').map(str::trim).filter(|f| !f.is_empty());

        for fact in facts {
            let step = steps.len() + 1;
            steps.push(reasoning_step(step, fact));
        }
    }

    steps.join("\n")
}

fn reasoning_step(step: usize, fact: &str) -> String {
    let parts: Vec<&str> = fact.split(" is ").collect();
    let [subject, value] = parts.as_slice() else {
        return format!("Step {step}: {fact}.");
    };
    let (subject, value) = (subject.trim(), value.trim());

    match subject.split_once(" of ") {
        Some((key, entity)) => {
            let key = key
                .replace("the ", "")
                .replace("company ", "")
                .replace("date ", "");
            format!("Step {step}: From the data, {key} for {entity} is {value}.")
        }
        None => format!("Step {step}: {subject} is {value}."),
    }
}

fn context_lines(example: &RawExample, key: &str) -> Vec<String> {
    example
        .lines(key)
        .into_iter()
        .filter(|line| line.trim() != ".")
        .collect()
}

fn final_answer(example: &RawExample) -> String {
    if example.has("final_result") {
        example.text("final_result")
    } else {
        example.text("answer")
    }
}

/// Build the few-shot demonstration block from the first `num_shots` rows.
///
/// The header always announces `num_shots`, even when the split holds fewer
/// rows.
#[must_use]
pub fn few_shot_block(split: &[RawExample], num_shots: usize) -> String {
    let examples: Vec<String> = split
        .iter()
        .take(num_shots)
        .enumerate()
        .map(|(idx, ex)| demonstration(idx + 1, ex))
        .collect();

    format!(
        "=== FEW-SHOT START ===\nFew-Shot Demonstrations ({num_shots})\n{}\n=== FEW-SHOT END ===\n\n",
        examples.join("\n\n")
    )
}

fn demonstration(number: usize, example: &RawExample) -> String {
    let question = example.text("question");
    let pre = context_lines(example, "pre_text");
    let post = context_lines(example, "post_text");
    let table = example.table("table");

    let mut parts = Vec::new();
    if !pre.is_empty() {
        parts.push(format!("[PRE]\n{}", head(&pre).join("\n")));
    }
    if !table.is_empty() {
        parts.push(format!("[TABLE]\n{}", format_table(&table)));
    }
    if !post.is_empty() {
        parts.push(format!("[POST]\n{}", head(&post).join("\n")));
    }

    let reasoning = convert_gold_inds_to_reasoning(&example.evidence("gold_inds"));
    format!(
        "Example {number}\nContext:\n{}\n\nQuestion: {}\n\nReasoning:\n{reasoning}\n\nTherefore, the answer is:\n#### {}",
        parts.join("\n\n"),
        question.trim(),
        final_answer(example)
    )
}

fn head(lines: &[String]) -> &[String] {
    &lines[..lines.len().min(FEW_SHOT_CONTEXT_LINES)]
}

/// FinQA normalizer holding the split's few-shot block.
#[derive(Debug, Clone)]
pub struct FinqaNormalizer {
    few_shot: String,
}

impl FinqaNormalizer {
    /// Build the normalizer, drawing `num_shots` demonstrations from `split`.
    #[must_use]
    pub fn from_split(split: &[RawExample], num_shots: usize) -> Self {
        Self {
            few_shot: few_shot_block(split, num_shots),
        }
    }

    /// The few-shot block prepended to every question.
    #[must_use]
    pub fn few_shot(&self) -> &str {
        &self.few_shot
    }
}

impl Normalizer for FinqaNormalizer {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Finqa
    }

    fn normalize(&self, example: &RawExample) -> Record {
        let pre = context_lines(example, "pre_text");
        let post = context_lines(example, "post_text");
        let table = format_table(&example.table("table"));

        let mut parts = Vec::new();
        if !pre.is_empty() {
            parts.push("[PRE]".to_string());
            parts.push(pre.join("\n"));
        }
        if !table.is_empty() {
            parts.push("[TABLE]".to_string());
            parts.push(table);
        }
        if !post.is_empty() {
            parts.push("[POST]".to_string());
            parts.push(post.join("\n"));
        }

        let user = format!(
            "{}Context:\n{}\n\nQuestion: {}\nPlease provide step-by-step reasoning and then give your final answer in the format '#### <answer>'.",
            self.few_shot,
            parts.join("\n\n"),
            example.text("question").trim()
        );

        let reasoning = convert_gold_inds_to_reasoning(&example.evidence("gold_inds"));
        let mut assistant = String::new();
        if !reasoning.is_empty() {
            assistant.push_str(&format!("\n\nReasoning:\n{reasoning}\n"));
        }
        assistant.push_str(&format!(
            "Therefore, the answer is:\n#### {}",
            final_answer(example)
        ));

        flatten_messages(SYSTEM_PROMPT, user.trim(), &assistant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(ToString::to_string).collect())
            .collect()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn sample() -> RawExample {
        RawExample::parse(
            r#"{
                "pre_text": ["Revenue grew.", ".", "Costs fell."],
                "post_text": [" . "],
                "table": [["", "2019", "2018"], ["revenue", "$ 10", "$ 8"]],
                "question": " what was the change in revenue? ",
                "gold_inds": ["the revenue of 2019 is $ 10 ; the revenue of 2018 is $ 8 ;"],
                "final_result": "2",
                "answer": "ignored"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_format_table_single_row() {
        let formatted = format_table(&table(&[&["a", "b", "c"]]));
        assert_eq!(formatted, "a | b | c\n--- | --- | ---");
        // header and separator only, nothing after the separator
        assert_eq!(formatted.lines().count(), 2);
    }

    #[test]
    fn test_format_table_ragged_rows() {
        let formatted = format_table(&table(&[&["h1", "h2"], &["x"], &["y", "z", "w"]]));
        assert_eq!(formatted, "h1 | h2\n--- | ---\nx\ny | z | w");
    }

    #[test]
    fn test_reasoning_of_split() {
        let steps = convert_gold_inds_to_reasoning(&strings(&[
            "the company date of payment is 2019 ;",
        ]));
        assert_eq!(steps, "Step 1: From the data, date for payment is 2019.");
    }

    #[test]
    fn test_reasoning_cleans_key_words() {
        let steps = convert_gold_inds_to_reasoning(&strings(&[
            "the company date total of the segment is 5",
        ]));
        assert_eq!(steps, "Step 1: From the data, total for the segment is 5.");
    }

    #[test]
    fn test_reasoning_numbering_spans_evidence() {
        let steps = convert_gold_inds_to_reasoning(&strings(&[
            "cash is 4 ; debt is 3 ;",
            "  ; plain fact  ",
            "a is b is c",
        ]));
        assert_eq!(
            steps,
            "Step 1: cash is 4.\nStep 2: debt is 3.\nStep 3: plain fact.\nStep 4: a is b is c."
        );
    }

    #[test]
    fn test_reasoning_empty() {
        assert_eq!(convert_gold_inds_to_reasoning(&[]), "");
        assert_eq!(convert_gold_inds_to_reasoning(&strings(&[" ; ;"])), "");
    }

    #[test]
    fn test_few_shot_block_layout() {
        let block = few_shot_block(&[sample()], 2);
        let expected = concat!(
            "=== FEW-SHOT START ===\n",
            "Few-Shot Demonstrations (2)\n",
            "Example 1\nContext:\n",
            "[PRE]\nRevenue grew.\nCosts fell.\n\n",
            "[TABLE]\n | 2019 | 2018\n--- | --- | ---\nrevenue | $ 10 | $ 8\n\n",
            "Question: what was the change in revenue?\n\n",
            "Reasoning:\n",
            "Step 1: From the data, revenue for 2019 is $ 10.\n",
            "Step 2: From the data, revenue for 2018 is $ 8.\n\n",
            "Therefore, the answer is:\n#### 2",
            "\n=== FEW-SHOT END ===\n\n",
        );
        assert_eq!(block, expected);
    }

    #[test]
    fn test_few_shot_block_truncates_context() {
        let pre: Vec<String> = (0..15).map(|i| format!("line {i}")).collect();
        let row = RawExample::parse(&serde_json::json!({ "pre_text": pre }).to_string()).unwrap();
        let block = few_shot_block(&[row], 1);
        assert!(block.contains("line 9\n\nQuestion: "));
        assert!(!block.contains("line 10"));
    }

    #[test]
    fn test_few_shot_block_empty_split() {
        assert_eq!(
            few_shot_block(&[], 2),
            "=== FEW-SHOT START ===\nFew-Shot Demonstrations (2)\n\n=== FEW-SHOT END ===\n\n"
        );
    }

    #[test]
    fn test_record_layout() {
        let split = vec![sample()];
        let normalizer = FinqaNormalizer::from_split(&split, 2);
        let record = normalizer.normalize(&split[0]);

        let expected_user = format!(
            "{}Context:\n[PRE]\n\nRevenue grew.\nCosts fell.\n\n[TABLE]\n\n | 2019 | 2018\n\
             --- | --- | ---\nrevenue | $ 10 | $ 8\n\nQuestion: what was the change in revenue?\n\
             Please provide step-by-step reasoning and then give your final answer in the format \
             '#### <answer>'.",
            normalizer.few_shot()
        );
        assert_eq!(record.instruction, format!("{SYSTEM_PROMPT}\n\n{expected_user}"));
        assert_eq!(record.input, "");
        assert_eq!(
            record.chosen,
            "\n\nReasoning:\nStep 1: From the data, revenue for 2019 is $ 10.\n\
             Step 2: From the data, revenue for 2018 is $ 8.\n\
             Therefore, the answer is:\n#### 2"
        );
    }

    #[test]
    fn test_answer_fallback_and_no_reasoning() {
        let row = RawExample::parse(r#"{"question": "q", "answer": "7"}"#).unwrap();
        let record = FinqaNormalizer::from_split(&[], 0).normalize(&row);
        assert_eq!(record.chosen, "Therefore, the answer is:\n#### 7");
        assert!(record.instruction.ends_with(
            "=== FEW-SHOT END ===\n\nContext:\n\n\nQuestion: q\nPlease provide step-by-step \
             reasoning and then give your final answer in the format '#### <answer>'."
        ));
    }

    #[test]
    fn test_gold_inds_object_form() {
        let row = RawExample::parse(
            r#"{"gold_inds": {"table_1": "cash is 4", "text_2": "debt is 3"}, "final_result": 1.5}"#,
        )
        .unwrap();
        let record = FinqaNormalizer::from_split(&[], 0).normalize(&row);
        assert_eq!(
            record.chosen,
            "\n\nReasoning:\nStep 1: cash is 4.\nStep 2: debt is 3.\nTherefore, the answer is:\n#### 1.5"
        );
    }
}
