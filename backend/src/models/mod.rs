//! Domain models shared across the pipeline.
//!
//! - [`FileType`] - the closed set of upload formats
//! - [`UploadedArtifact`] - a stored upload, readable but never mutated
//! - [`Shape`] - which top-level list a document is aggregated over
//! - [`ConvertedArtifact`] - output of a successful conversion
//! - [`ValidationErrorSet`] - schema errors grouped by message

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::PathBuf;

use crate::error::ConversionFailure;

// =============================================================================
// File Type
// =============================================================================

/// Format of an uploaded file.
///
/// Chosen once by [`crate::detect::detect_file_type`]; downstream code matches
/// on the variant and never compares strings again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Json,
    Csv,
    Xlsx,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Json => "json",
            FileType::Csv => "csv",
            FileType::Xlsx => "xlsx",
        }
    }

    /// Whether the upload needs unflattening before it can be validated.
    pub fn is_tabular(&self) -> bool {
        matches!(self, FileType::Csv | FileType::Xlsx)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Uploaded Artifact
// =============================================================================

/// An upload as handed over by storage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedArtifact {
    /// Storage id.
    pub id: String,
    /// Name the file was uploaded with.
    pub name: String,
    /// Location of the original bytes.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

impl UploadedArtifact {
    /// Open a fresh reader positioned at the start of the file.
    ///
    /// Detection consumes a byte from the stream it is given, so every full
    /// read goes through a new handle.
    pub fn open(&self) -> std::io::Result<File> {
        File::open(&self.path)
    }
}

// =============================================================================
// Data Shape
// =============================================================================

/// Top-level list a document's statistics are computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// OCDS release package (`releases`).
    Releases,
    /// OCDS record package (`records`).
    Records,
    /// 360Giving data (`grants`).
    Grants,
}

impl std::str::FromStr for Shape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "releases" | "release" => Ok(Shape::Releases),
            "records" | "record" => Ok(Shape::Records),
            "grants" | "grant" => Ok(Shape::Grants),
            other => Err(format!("unknown shape '{}' (expected releases, records or grants)", other)),
        }
    }
}

// =============================================================================
// Conversion Results
// =============================================================================

/// Direction of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conversion {
    /// Nested JSON to spreadsheet.
    Flatten,
    /// Spreadsheet to nested JSON.
    Unflatten,
}

/// A conversion output written next to the upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedArtifact {
    pub conversion: Conversion,
    /// Path of the converted file.
    pub path: PathBuf,
    /// Public URL of the converted file.
    pub url: String,
    pub size_bytes: u64,
    /// Size of the title-keyed variant, when one was produced.
    pub titled_size_bytes: Option<u64>,
}

/// Outcome of either conversion direction.
pub type ConversionResult = Result<ConvertedArtifact, ConversionFailure>;

// =============================================================================
// Validation Errors
// =============================================================================

/// Schema validation errors grouped by message.
///
/// Messages keep the order in which they were first seen, and each message
/// keeps its occurrence paths in encounter order. A message is only present
/// once at least one path has been recorded for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrorSet {
    groups: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl ValidationErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `message` at `path`.
    pub fn record(&mut self, message: impl Into<String>, path: impl Into<String>) {
        let message = message.into();
        match self.index.get(&message) {
            Some(&i) => self.groups[i].1.push(path.into()),
            None => {
                self.index.insert(message.clone(), self.groups.len());
                self.groups.push((message, vec![path.into()]));
            }
        }
    }

    /// Number of distinct messages.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of recorded occurrences.
    pub fn occurrences(&self) -> usize {
        self.groups.iter().map(|(_, paths)| paths.len()).sum()
    }

    /// Paths recorded for a message.
    pub fn get(&self, message: &str) -> Option<&[String]> {
        self.index.get(message).map(|&i| self.groups[i].1.as_slice())
    }

    /// Messages in first-seen order.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(m, _)| m.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.groups.iter().map(|(m, p)| (m.as_str(), p.as_slice()))
    }
}

impl Serialize for ValidationErrorSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (message, paths) in &self.groups {
            map.serialize_entry(message, paths)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_serializes_lowercase() {
        assert_eq!(serde_json::to_value(FileType::Xlsx).unwrap(), "xlsx");
        assert_eq!(FileType::Csv.to_string(), "csv");
        assert!(FileType::Csv.is_tabular());
        assert!(!FileType::Json.is_tabular());
    }

    #[test]
    fn test_shape_from_str() {
        assert_eq!("releases".parse::<Shape>().unwrap(), Shape::Releases);
        assert_eq!("Grants".parse::<Shape>().unwrap(), Shape::Grants);
        assert!("tenders".parse::<Shape>().is_err());
    }

    #[test]
    fn test_error_set_keeps_first_seen_order() {
        let mut errors = ValidationErrorSet::new();
        errors.record("b is required", "releases/0");
        errors.record("a is required", "releases/1");
        errors.record("b is required", "releases/2");

        let messages: Vec<&str> = errors.messages().collect();
        assert_eq!(messages, vec!["b is required", "a is required"]);
        assert_eq!(
            errors.get("b is required").unwrap(),
            &["releases/0".to_string(), "releases/2".to_string()]
        );
        assert_eq!(errors.occurrences(), 3);
    }

    #[test]
    fn test_error_set_serializes_as_ordered_map() {
        let mut errors = ValidationErrorSet::new();
        errors.record("z", "");
        errors.record("a", "x/0");

        let json = serde_json::to_string(&errors).unwrap();
        assert_eq!(json, r#"{"z":[""],"a":["x/0"]}"#);
    }
}
