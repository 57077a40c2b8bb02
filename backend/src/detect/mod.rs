//! Upload file type detection.
//!
//! The filename extension wins; only extensionless (or unknown-extension)
//! uploads are sniffed, and only by their first byte.

use std::io::Read;
use tracing::debug;

use crate::error::{DetectError, DetectResult};
use crate::models::{FileType, UploadedArtifact};

/// Classify an upload from its name, falling back to the first content byte.
///
/// At most one byte is read from `reader`. Callers that need the full content
/// afterwards must open a new reader.
///
/// # Example
/// ```ignore
/// use cove::detect::detect_file_type;
/// use cove::FileType;
///
/// assert_eq!(detect_file_type("data.csv", &b"{}"[..]).unwrap(), FileType::Csv);
/// assert_eq!(detect_file_type("data", &b"[1]"[..]).unwrap(), FileType::Json);
/// ```
pub fn detect_file_type<R: Read>(name: &str, mut reader: R) -> DetectResult<FileType> {
    if name.ends_with(".json") {
        return Ok(FileType::Json);
    }
    if name.ends_with(".xlsx") {
        return Ok(FileType::Xlsx);
    }
    if name.ends_with(".csv") {
        return Ok(FileType::Csv);
    }

    let mut first = [0u8; 1];
    let read = reader.read(&mut first)?;
    debug!(name, read, first_byte = first[0], "sniffing upload without known extension");

    match (read, first[0]) {
        (1, b'{') | (1, b'[') => Ok(FileType::Json),
        _ => Err(DetectError::UnrecognisedFileType),
    }
}

/// Classify a stored upload.
pub fn detect_artifact(artifact: &UploadedArtifact) -> DetectResult<FileType> {
    if has_known_extension(&artifact.name) {
        return detect_file_type(&artifact.name, std::io::empty());
    }
    let file = artifact.open()?;
    detect_file_type(&artifact.name, file)
}

fn has_known_extension(name: &str) -> bool {
    [".json", ".xlsx", ".csv"].iter().any(|ext| name.ends_with(ext))
}
