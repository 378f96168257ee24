//! MRPC paraphrase detection.

use super::{flatten_messages, DatasetKind, Normalizer};
use crate::raw::RawExample;
use crate::record::Record;

const SYSTEM_PROMPT: &str = concat!(
    "Below is an instruction that describes a task. ",
    "Write a response that appropriately completes the request.\n\n",
    "You will be given two sentences. Your task is to determine whether they are paraphrases of each other. ",
    "Respond with ONLY 'equivalent' if they are paraphrases or 'not_equivalent' if they are not.",
);

/// MRPC normalizer.
///
/// Reads the GLUE field names (`sentence1`, `sentence2`) and falls back to the
/// SetFit mirror's (`text1`, `text2`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MrpcNormalizer;

fn sentence(example: &RawExample, glue: &str, setfit: &str) -> String {
    if example.has(glue) {
        example.text(glue)
    } else {
        example.text(setfit)
    }
}

impl Normalizer for MrpcNormalizer {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Mrpc
    }

    fn normalize(&self, example: &RawExample) -> Record {
        let text1 = sentence(example, "sentence1", "text1");
        let text2 = sentence(example, "sentence2", "text2");
        let label = if example.integer("label") == Some(1) {
            "equivalent"
        } else {
            "not_equivalent"
        };

        let user = format!(
            "Sentence 1: {}\n\nSentence 2: {}\n\nAre these sentences paraphrases of each other?",
            text1.trim(),
            text2.trim()
        );
        flatten_messages(SYSTEM_PROMPT, &user, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glue_fields() {
        let row = RawExample::parse(
            r#"{"sentence1": " He said hi. ", "sentence2": "He greeted.", "label": 1, "idx": 0}"#,
        )
        .unwrap();
        let record = MrpcNormalizer.normalize(&row);
        assert!(record.instruction.ends_with(
            "'not_equivalent' if they are not.\n\nSentence 1: He said hi.\n\n\
             Sentence 2: He greeted.\n\nAre these sentences paraphrases of each other?"
        ));
        assert_eq!(record.chosen, "equivalent");
    }

    #[test]
    fn test_setfit_fallback() {
        let row = RawExample::parse(r#"{"text1": "A", "text2": "B", "label": 0}"#).unwrap();
        let record = MrpcNormalizer.normalize(&row);
        assert!(record.instruction.contains("Sentence 1: A\n\nSentence 2: B"));
        assert_eq!(record.chosen, "not_equivalent");
    }

    #[test]
    fn test_string_label_is_not_equivalent() {
        let row = RawExample::parse(r#"{"sentence1": "A", "sentence2": "B", "label": "1"}"#).unwrap();
        assert_eq!(MrpcNormalizer.normalize(&row).chosen, "not_equivalent");

        let row = RawExample::parse(r#"{"sentence1": "A", "sentence2": "B", "label": true}"#).unwrap();
        assert_eq!(MrpcNormalizer.normalize(&row).chosen, "equivalent");
    }

    #[test]
    fn test_missing_label_is_not_equivalent() {
        let row = RawExample::parse(r#"{"sentence1": "A", "sentence2": "B"}"#).unwrap();
        assert_eq!(MrpcNormalizer.normalize(&row).chosen, "not_equivalent");
    }

    #[test]
    fn test_system_prompt_prefix() {
        let record = MrpcNormalizer.normalize(&RawExample::default());
        assert!(record
            .instruction
            .starts_with("Below is an instruction that describes a task. Write a response"));
    }
}
