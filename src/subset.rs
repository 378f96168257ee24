//! Leading-subset slicing of JSON array files.
//!
//! A file `<stem>.json` is sliced to `<stem>_subset_<N>.json` in the same
//! directory. Elements are copied verbatim, whatever their shape.

use std::path::{Path, PathBuf};

use crate::config::PrepConfig;
use crate::error::{PrepError, Result};
use crate::record;

/// Summary of one sliced file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceReport {
    /// Input file.
    pub input: PathBuf,
    /// Written subset file.
    pub output: PathBuf,
    /// Elements in the input.
    pub original: usize,
    /// Elements written, `min(original, N)`.
    pub kept: usize,
}

/// Outcome for one file of a batch.
#[derive(Debug)]
pub struct FileOutcome {
    /// File name as listed in the batch.
    pub file: String,
    /// Slice report, or the error that stopped this file.
    pub result: Result<SliceReport>,
}

impl FileOutcome {
    /// Whether the file was sliced.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Path of the subset file for `input` at size `size`.
///
/// ```rust
/// use std::path::Path;
/// use mlora_prep::subset::subset_path;
///
/// assert_eq!(
///     subset_path(Path::new("data/gsm8k_train.json"), 128),
///     Path::new("data/gsm8k_train_subset_128.json")
/// );
/// ```
#[must_use]
pub fn subset_path(input: &Path, size: usize) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}_subset_{size}.json"))
}

/// Keep the first `size` elements of the JSON array in `input`.
pub fn slice_file(input: &Path, size: usize) -> Result<SliceReport> {
    let mut items = record::read_json_array(input)?;
    let original = items.len();
    items.truncate(size);

    let output = subset_path(input, size);
    record::write_json_array(&items, &output)?;

    Ok(SliceReport {
        input: input.to_path_buf(),
        output,
        original,
        kept: items.len(),
    })
}

/// Slice every configured file in the data directory.
///
/// Failures are logged and recorded per file; the batch always runs to the end.
pub fn slice_all(config: &PrepConfig) -> Vec<FileOutcome> {
    let data_dir = config.data_path();
    let size = config.subset.size;

    config
        .subset
        .files
        .iter()
        .map(|file| {
            tracing::info!("Processing {file}...");
            let input = data_dir.join(file);
            let result = slice_file(&input, size);

            match &result {
                Ok(report) => {
                    tracing::info!("Sliced {} to {} samples", report.original, report.kept);
                    tracing::info!("Saved to {}", report.output.display());
                }
                Err(PrepError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!("File not found: {}", input.display());
                }
                Err(e) => tracing::warn!("Failed to process {file}: {e}"),
            }

            FileOutcome {
                file: file.clone(),
                result,
            }
        })
        .collect()
}
