//! The canonical training record and its on-disk form.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;

use crate::error::{PrepError, Result};

/// A single instruction-tuning example as consumed by the trainer.
///
/// # Example
///
/// ```rust
/// use mlora_prep::Record;
///
/// let record = Record::new("What is 2 + 2?", "", "4");
/// let json = serde_json::to_string(&record).unwrap();
/// assert_eq!(json, r#"{"instruction":"What is 2 + 2?","input":"","chosen":"4"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Prompt text, including any system preamble.
    pub instruction: String,
    /// Extra input. Always empty for the bundled normalizers.
    #[serde(default)]
    pub input: String,
    /// Reference completion.
    pub chosen: String,
}

impl Record {
    /// Create a record from its three fields.
    pub fn new(
        instruction: impl Into<String>,
        input: impl Into<String>,
        chosen: impl Into<String>,
    ) -> Self {
        Self {
            instruction: instruction.into(),
            input: input.into(),
            chosen: chosen.into(),
        }
    }
}

/// Write any serializable slice as a JSON array with 4-space indentation.
///
/// Non-ASCII text is written verbatim. Parent directories are created.
pub fn write_json_array<T: Serialize, P: AsRef<Path>>(items: &[T], path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
    items.serialize(&mut ser)?;
    writer.flush()?;
    Ok(())
}

/// Read a JSON array of arbitrary values.
pub fn read_json_array<P: AsRef<Path>>(path: P) -> Result<Vec<serde_json::Value>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    match value {
        serde_json::Value::Array(items) => Ok(items),
        other => Err(PrepError::Dataset(format!(
            "{} does not hold a JSON array (found {})",
            path.display(),
            json_kind(&other)
        ))),
    }
}

/// Read a JSON array of records.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let content = std::fs::read_to_string(path)?;
    let records = serde_json::from_str(&content)?;
    Ok(records)
}

/// Write records as a JSON array.
pub fn write_records<P: AsRef<Path>>(records: &[Record], path: P) -> Result<()> {
    write_json_array(records, path)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
