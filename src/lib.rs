//! # mlora-prep
//!
//! Data preparation and baseline evaluation for multi-adapter LoRA
//! fine-tuning runs.
//!
//! ## Features
//!
//! - **Normalization** - GSM8K, Winogrande, MRPC and FinQA rows to a uniform
//!   `{instruction, input, chosen}` record
//! - **Subsets** - leading slices of record files for quick runs
//! - **Experiment configs** - one trainer YAML per dataset and concurrency
//!   level, with hyperparameters drawn from fixed pools
//! - **Token statistics** - mean and max token lengths of a record file
//! - **Evaluation** - GSM8K accuracy of a base model plus merged LoRA adapter
//!
//! ## Quick Start (CLI)
//!
//! ```bash
//! # Write the default configuration
//! mlora-prep init prep.yaml
//!
//! # Normalize raw exports, slice subsets, generate trainer configs
//! mlora-prep --config prep.yaml normalize
//! mlora-prep --config prep.yaml subset
//! mlora-prep --config prep.yaml gen-configs --seed 42
//!
//! # Evaluate an adapter on the GSM8K test split
//! mlora-prep --config prep.yaml eval --limit 50
//! ```
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use mlora_prep::{normalize, subset, PrepConfig};
//!
//! # fn main() -> mlora_prep::Result<()> {
//! let config = PrepConfig::from_file("prep.yaml")?;
//! config.validate()?;
//!
//! normalize::normalize_all(&config, &config.normalize.datasets)?;
//! for outcome in subset::slice_all(&config) {
//!     println!("{}: {}", outcome.file, outcome.is_ok());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod eval;
pub mod experiment;
pub mod model;
pub mod normalize;
pub mod raw;
pub mod record;
pub mod stats;
pub mod subset;

pub use config::PrepConfig;
pub use error::{PrepError, Result};
pub use record::Record;
