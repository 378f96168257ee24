//! Winogrande fill-in-the-blank.

use super::{flatten_messages, DatasetKind, Normalizer};
use crate::raw::RawExample;
use crate::record::Record;

const SYSTEM_PROMPT: &str = concat!(
    "Below is an instruction that describes a task. ",
    "Write a response that appropriately completes the request.\n\n",
    "You will be given a sentence with a blank (indicated by _) and two options. ",
    "Choose the option that best fits the blank to create a coherent sentence. ",
    "Respond with ONLY the number 1 or 2, corresponding to your choice.",
);

/// Winogrande normalizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct WinograndeNormalizer;

impl Normalizer for WinograndeNormalizer {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Winogrande
    }

    fn normalize(&self, example: &RawExample) -> Record {
        let sentence = example.text("sentence");
        let option1 = example.text("option1");
        let option2 = example.text("option2");
        let answer = example.text("answer");

        let user = format!(
            "Sentence: {}\n\nOption 1: {}\nOption 2: {}\n\nWhich option best fits the blank? Answer with 1 or 2.",
            sentence.trim(),
            option1.trim(),
            option2.trim()
        );
        let assistant = format!("The answer is: {}", answer.trim());
        flatten_messages(SYSTEM_PROMPT, &user, &assistant)
    }
}
