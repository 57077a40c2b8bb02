//! Error types for the CoVE convert/validate/explore pipeline.
//!
//! One enum per layer, converted upwards with `From` so `?` works across
//! boundaries:
//!
//! - [`DetectError`] - file type detection
//! - [`StorageError`] - upload storage
//! - [`SchemaError`] - schema fetching and compilation
//! - [`FlattenError`] - the tabular ⇄ JSON engine
//! - [`ConversionFailure`] - a structured conversion result failure
//! - [`ConfigError`] - namespace configuration
//! - [`ExploreError`] - top-level orchestration errors
//!
//! [`ExploreError::kind`] collapses everything into a [`FailureKind`], which
//! is what the presentation layer keys its messages and status codes on.

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Detection Errors
// =============================================================================

/// Errors while classifying an upload.
#[derive(Debug, Error)]
pub enum DetectError {
    /// Neither the name nor the first byte identify a supported format.
    #[error("Unrecognised file type (expected json, csv or xlsx)")]
    UnrecognisedFileType,

    /// Failed to read the leading byte.
    #[error("Failed to read upload: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors from the upload storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No upload with this id.
    #[error("Upload not found: {0}")]
    NotFound(String),

    /// The upload record exists but its file is gone (retention expiry).
    #[error("Upload expired: {0}")]
    Expired(String),

    /// IO error.
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata sidecar could not be read or written.
    #[error("Storage metadata error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Errors while obtaining or compiling a JSON schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Network failure or a body that is not JSON.
    #[error("Failed to fetch schema {url}: {message}")]
    Fetch { url: String, message: String },

    /// The schema document could not be compiled.
    #[error("Invalid schema: {0}")]
    Invalid(String),
}

// =============================================================================
// Flattening Engine Errors
// =============================================================================

/// Errors raised by a [`crate::flatten::Flattener`].
#[derive(Debug, Error)]
pub enum FlattenError {
    /// The JSON input could not be parsed.
    #[error("{0}")]
    BadlyFormedJson(String),

    /// Text could not be decoded with the requested encoding.
    #[error("Could not decode {path} as {encoding}")]
    Encoding { path: String, encoding: String },

    /// Invalid CSV content.
    #[error("CSV error: {0}")]
    Csv(String),

    /// Invalid or unreadable workbook.
    #[error("XLSX error: {0}")]
    Xlsx(String),

    /// The input does not have the expected shape.
    #[error("Unexpected input: {0}")]
    Shape(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<csv::Error> for FlattenError {
    fn from(err: csv::Error) -> Self {
        FlattenError::Csv(err.to_string())
    }
}

// =============================================================================
// Conversion Failures
// =============================================================================

/// Which way a conversion failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConversionFailureKind {
    /// The engine could not convert the input.
    ConversionError,
    /// The input claimed to be JSON but is not well formed.
    MalformedInput,
}

/// Structured failure produced by the conversion pipeline.
///
/// Both conversion directions return this; the orchestrator decides whether
/// it aborts the request or only degrades the response.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ConversionFailure {
    pub kind: ConversionFailureKind,
    pub message: String,
}

impl ConversionFailure {
    pub fn conversion(message: impl Into<String>) -> Self {
        Self {
            kind: ConversionFailureKind::ConversionError,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: ConversionFailureKind::MalformedInput,
            message: message.into(),
        }
    }
}

impl From<FlattenError> for ConversionFailure {
    fn from(err: FlattenError) -> Self {
        match err {
            FlattenError::BadlyFormedJson(message) => ConversionFailure::malformed(message),
            other => ConversionFailure::conversion(other.to_string()),
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading namespace configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Namespace is not one of the known presets.
    #[error("Unknown namespace: {0}")]
    UnknownNamespace(String),

    /// Invalid value in an environment variable.
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },

    /// Override file could not be read.
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Override file is not valid JSON.
    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Explore Errors (top-level)
// =============================================================================

/// Failure kinds surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    NotFound,
    Expired,
    UnrecognisedFileType,
    MalformedJson,
    ConversionError,
    SchemaFetchError,
    Internal,
}

/// Top-level errors of the explore operation.
#[derive(Debug, Error)]
pub enum ExploreError {
    /// Upload id is unknown.
    #[error("Upload not found: {0}")]
    NotFound(String),

    /// Upload file has been removed.
    #[error("Upload expired: {0}")]
    Expired(String),

    /// Upload is not json, csv or xlsx.
    #[error("Unrecognised file type")]
    UnrecognisedFileType,

    /// JSON upload does not parse.
    #[error("Malformed JSON: {0}")]
    MalformedJson(String),

    /// Tabular upload could not be converted.
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Schema could not be fetched or compiled.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Unexpected IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExploreError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExploreError::NotFound(_) => FailureKind::NotFound,
            ExploreError::Expired(_) => FailureKind::Expired,
            ExploreError::UnrecognisedFileType => FailureKind::UnrecognisedFileType,
            ExploreError::MalformedJson(_) => FailureKind::MalformedJson,
            ExploreError::Conversion(_) => FailureKind::ConversionError,
            ExploreError::Schema(_) => FailureKind::SchemaFetchError,
            ExploreError::Io(_) => FailureKind::Internal,
        }
    }
}

impl From<StorageError> for ExploreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => ExploreError::NotFound(id),
            StorageError::Expired(id) => ExploreError::Expired(id),
            StorageError::Io(e) => ExploreError::Io(e),
            StorageError::Json(e) => ExploreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e,
            )),
        }
    }
}

impl From<DetectError> for ExploreError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::UnrecognisedFileType => ExploreError::UnrecognisedFileType,
            DetectError::Io(e) => ExploreError::Io(e),
        }
    }
}

impl From<ConversionFailure> for ExploreError {
    fn from(failure: ConversionFailure) -> Self {
        match failure.kind {
            ConversionFailureKind::MalformedInput => ExploreError::MalformedJson(failure.message),
            ConversionFailureKind::ConversionError => ExploreError::Conversion(failure.message),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for detection.
pub type DetectResult<T> = Result<T, DetectError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for the flattening engine.
pub type FlattenResult<T> = Result<T, FlattenError>;

/// Result type for the explore operation.
pub type ExploreResult<T> = Result<T, ExploreError>;
