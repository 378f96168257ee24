//! Error types for mlora-prep.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side
//! is [`PrepError`].
//!
//! # Example
//!
//! ```rust
//! use mlora_prep::{PrepConfig, PrepError};
//!
//! # fn main() {
//! match PrepConfig::from_file("/nonexistent/prep.yaml") {
//!     Ok(_) => println!("Loaded config"),
//!     Err(PrepError::Io(e)) => eprintln!("Cannot read config: {e}"),
//!     Err(e) => eprintln!("Other error: {e}"),
//! }
//! # }
//! ```

use thiserror::Error;

/// Result type alias for mlora-prep operations.
pub type Result<T> = std::result::Result<T, PrepError>;

/// Errors that can occur in mlora-prep.
///
/// # Example
///
/// ```rust
/// use mlora_prep::{PrepError, Result};
///
/// fn require_rows(rows: usize) -> Result<()> {
///     if rows == 0 {
///         return Err(PrepError::Dataset("split is empty".to_string()));
///     }
///     Ok(())
/// }
///
/// assert!(require_rows(0).is_err());
/// assert!(require_rows(3).is_ok());
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PrepError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid YAML document (prep config or experiment config).
    #[error("invalid YAML: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid JSON document.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Dataset error.
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Experiment config violates a structural invariant.
    #[error("experiment error: {0}")]
    Experiment(String),

    /// Model loading error.
    #[error("model error: {0}")]
    Model(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Candle error.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Tokenizer error.
    #[error("tokenizer error: {0}")]
    Tokenizer(#[from] tokenizers::Error),

    /// Progress bar template error.
    #[error("template error: {0}")]
    Template(String),
}

impl From<indicatif::style::TemplateError> for PrepError {
    fn from(err: indicatif::style::TemplateError) -> Self {
        PrepError::Template(err.to_string())
    }
}
