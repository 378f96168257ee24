//! GSM8K grade-school math.

use serde::{Deserialize, Serialize};

use super::{flatten_messages, DatasetKind, Normalizer};
use crate::raw::RawExample;
use crate::record::Record;

const SYSTEM_PROMPT: &str = concat!(
    "Below is an instruction that describes a task, paired with an input that provides further context.",
    "Write a response that appropriately completes the request.\n\n",
    "Solve the following grade-school math problem. Show your reasoning step-by-step",
    "and give the final numeric answer in the format '#### <answer>'.\n\n",
);

/// Record layout for GSM8K.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gsm8kStyle {
    /// System prompt plus trimmed question; trimmed answer as completion.
    #[default]
    Templated,
    /// Raw question as instruction, raw answer as completion.
    Plain,
}

/// GSM8K normalizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gsm8kNormalizer {
    style: Gsm8kStyle,
}

impl Gsm8kNormalizer {
    /// Create a normalizer producing `style` records.
    #[must_use]
    pub fn new(style: Gsm8kStyle) -> Self {
        Self { style }
    }
}

impl Normalizer for Gsm8kNormalizer {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Gsm8k
    }

    fn normalize(&self, example: &RawExample) -> Record {
        let question = example.text("question");
        let answer = example.text("answer");
        match self.style {
            Gsm8kStyle::Templated => {
                flatten_messages(SYSTEM_PROMPT, question.trim(), answer.trim())
            }
            Gsm8kStyle::Plain => Record::new(question, "", answer),
        }
    }
}
