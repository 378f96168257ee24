//! Dataset normalizers.
//!
//! Each normalizer maps one dataset's native row schema onto [`Record`].
//! Normalization never fails per row: missing fields read as empty text.
//!
//! # Example
//!
//! ```rust
//! use mlora_prep::normalize::{Gsm8kNormalizer, Gsm8kStyle, Normalizer};
//! use mlora_prep::raw::RawExample;
//!
//! # fn main() -> mlora_prep::Result<()> {
//! let row = RawExample::parse(r#"{"question": "1+1?", "answer": "2\n#### 2"}"#)?;
//! let record = Gsm8kNormalizer::new(Gsm8kStyle::Plain).normalize(&row);
//! assert_eq!(record.instruction, "1+1?");
//! assert_eq!(record.chosen, "2\n#### 2");
//! # Ok(())
//! # }
//! ```

mod finqa;
mod gsm8k;
mod mrpc;
mod winogrande;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use finqa::{convert_gold_inds_to_reasoning, few_shot_block, format_table, FinqaNormalizer};
pub use gsm8k::{Gsm8kNormalizer, Gsm8kStyle};
pub use mrpc::MrpcNormalizer;
pub use winogrande::WinograndeNormalizer;

use crate::config::PrepConfig;
use crate::error::{PrepError, Result};
use crate::raw::{self, RawExample};
use crate::record::{self, Record};

/// Datasets with a bundled normalizer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// GSM8K grade-school math (`main` config).
    Gsm8k,
    /// Winogrande (`winogrande_debiased` config).
    Winogrande,
    /// MRPC paraphrase detection (GLUE or the SetFit mirror).
    Mrpc,
    /// FinQA financial question answering.
    Finqa,
}

impl DatasetKind {
    /// All datasets, in normalization order.
    pub const ALL: [DatasetKind; 4] = [
        DatasetKind::Gsm8k,
        DatasetKind::Winogrande,
        DatasetKind::Mrpc,
        DatasetKind::Finqa,
    ];

    /// Short name used in file and directory names.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            DatasetKind::Gsm8k => "gsm8k",
            DatasetKind::Winogrande => "winogrande",
            DatasetKind::Mrpc => "mrpc",
            DatasetKind::Finqa => "finqa",
        }
    }

    /// Stem of the normalized training file, e.g. `gsm8k_train`.
    #[must_use]
    pub fn output_stem(self) -> String {
        format!("{}_train", self.name())
    }

    /// Hub dataset the raw export comes from.
    #[must_use]
    pub fn source(self) -> &'static str {
        match self {
            DatasetKind::Gsm8k => "openai/gsm8k (main)",
            DatasetKind::Winogrande => "allenai/winogrande (winogrande_debiased)",
            DatasetKind::Mrpc => "glue/mrpc or SetFit/mrpc",
            DatasetKind::Finqa => "dreamerdeo/finqa",
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DatasetKind {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self> {
        DatasetKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PrepError::Dataset(format!("Unknown dataset: {s}")))
    }
}

/// Maps raw rows of one dataset to records.
pub trait Normalizer {
    /// Dataset handled by this normalizer.
    fn kind(&self) -> DatasetKind;

    /// Convert one raw row into exactly one record.
    fn normalize(&self, example: &RawExample) -> Record;

    /// Convert a whole split, preserving order.
    fn normalize_split(&self, split: &[RawExample]) -> Vec<Record> {
        split.iter().map(|ex| self.normalize(ex)).collect()
    }
}

/// Build `{instruction: system + "\n\n" + user, input: "", chosen: assistant}`.
#[must_use]
pub fn flatten_messages(system: &str, user: &str, assistant: &str) -> Record {
    Record {
        instruction: format!("{system}\n\n{user}"),
        input: String::new(),
        chosen: assistant.to_string(),
    }
}

/// Build the normalizer for `kind`.
///
/// The FinQA normalizer draws its few-shot demonstrations from `split`.
#[must_use]
pub fn normalizer_for(
    kind: DatasetKind,
    config: &PrepConfig,
    split: &[RawExample],
) -> Box<dyn Normalizer> {
    match kind {
        DatasetKind::Gsm8k => Box::new(Gsm8kNormalizer::new(config.normalize.gsm8k_style)),
        DatasetKind::Winogrande => Box::new(WinograndeNormalizer),
        DatasetKind::Mrpc => Box::new(MrpcNormalizer),
        DatasetKind::Finqa => Box::new(FinqaNormalizer::from_split(
            split,
            config.normalize.finqa_few_shot,
        )),
    }
}

/// Result of normalizing one dataset.
#[derive(Debug, Clone)]
pub struct NormalizeOutcome {
    /// Dataset processed.
    pub kind: DatasetKind,
    /// File written.
    pub output: PathBuf,
    /// Number of records written.
    pub records: usize,
}

/// Normalize one dataset's raw split and write `<data_dir>/<dataset>_<split>.json`.
pub fn normalize_dataset(config: &PrepConfig, kind: DatasetKind) -> Result<NormalizeOutcome> {
    let split = &config.normalize.split;
    let input = config.raw_split_path(kind, split);
    tracing::info!("Processing {} from {}", kind.source(), input.display());

    let rows = raw::load_split(&input)?;
    let normalizer = normalizer_for(kind, config, &rows);
    let records = normalizer.normalize_split(&rows);

    let output = config
        .data_path()
        .join(format!("{}_{split}.json", kind.name()));
    record::write_records(&records, &output)?;
    tracing::info!("Saved {} items to {}", records.len(), output.display());

    Ok(NormalizeOutcome {
        kind,
        output,
        records: records.len(),
    })
}

/// Normalize several datasets in order, stopping at the first failure.
pub fn normalize_all(config: &PrepConfig, kinds: &[DatasetKind]) -> Result<Vec<NormalizeOutcome>> {
    kinds
        .iter()
        .map(|&kind| normalize_dataset(config, kind))
        .collect()
}
