//! Raw dataset rows as exported from the dataset hub.
//!
//! A split is stored locally as JSON Lines (one object per line) or as a single
//! JSON array of objects. Field access is lenient: missing or `null` fields read
//! as empty, numbers and booleans read as their text form.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{PrepError, Result};

/// One row of an external dataset split.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawExample {
    fields: Map<String, Value>,
}

impl RawExample {
    /// Wrap an already parsed JSON object.
    #[must_use]
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Parse a single JSON object.
    pub fn parse(json: &str) -> Result<Self> {
        match serde_json::from_str(json)? {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(PrepError::Dataset("row is not a JSON object".into())),
        }
    }

    /// Whether `key` is present (even if `null`).
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Raw JSON value of a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Field rendered as text, or `""` when missing.
    #[must_use]
    pub fn text(&self, key: &str) -> String {
        self.fields.get(key).map(value_text).unwrap_or_default()
    }

    /// List field rendered item by item. A bare string reads as one line.
    #[must_use]
    pub fn lines(&self, key: &str) -> Vec<String> {
        match self.fields.get(key) {
            Some(Value::Array(items)) => items.iter().map(value_text).collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![value_text(other)],
        }
    }

    /// Table field as rows of cells.
    #[must_use]
    pub fn table(&self, key: &str) -> Vec<Vec<String>> {
        match self.fields.get(key) {
            Some(Value::Array(rows)) => rows
                .iter()
                .map(|row| match row {
                    Value::Array(cells) => cells.iter().map(value_text).collect(),
                    other => vec![value_text(other)],
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Evidence field: a list of strings, or an object whose values are read
    /// in order.
    #[must_use]
    pub fn evidence(&self, key: &str) -> Vec<String> {
        match self.fields.get(key) {
            Some(Value::Object(map)) => map.values().map(value_text).collect(),
            _ => self.lines(key),
        }
    }

    /// Integer field. Booleans read as 0/1; strings are never integers.
    #[must_use]
    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.fields.get(key)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Load a raw split from a `.jsonl` or `.json` export.
///
/// The format is detected from content: a leading `[` means a JSON array,
/// anything else is read line by line.
pub fn load_split<P: AsRef<Path>>(path: P) -> Result<Vec<RawExample>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PrepError::Dataset(format!(
            "Raw split not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    if content.trim_start().starts_with('[') {
        let rows: Vec<Value> = serde_json::from_str(&content)
            .map_err(|e| PrepError::Dataset(format!("Failed to parse array: {e}")))?;
        return rows
            .into_iter()
            .enumerate()
            .map(|(idx, row)| match row {
                Value::Object(fields) => Ok(RawExample::new(fields)),
                _ => Err(PrepError::Dataset(format!(
                    "Row {idx} is not a JSON object"
                ))),
            })
            .collect();
    }

    let mut examples = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let example = RawExample::parse(line)
            .map_err(|e| PrepError::Dataset(format!("Failed to parse line: {e}")))?;
        examples.push(example);
    }

    tracing::debug!("Loaded {} raw rows from {}", examples.len(), path.display());
    Ok(examples)
}
