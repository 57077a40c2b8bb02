//! # CoVE - Convert, Validate and Explore open data
//!
//! CoVE takes an uploaded file (JSON, CSV or XLSX) in one of the supported
//! data standards (OCDS, 360Giving), converts it to the other representation,
//! validates the JSON form against the standard's schema and summarises it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Upload    │────▶│   Detect    │────▶│   Convert   │────▶│  Validate   │────▶│  Aggregate  │
//! │  (storage)  │     │ (json/csv/  │     │ (flatten /  │     │ (jsonschema │     │ (releases,  │
//! │             │     │   xlsx)     │     │  unflatten) │     │  + ids)     │     │  grants)    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cove::{CoveConfig, Explorer, HttpSchemaSource, LocalStorage, Namespace, RuleSet};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CoveConfig::for_namespace(Namespace::ThreeSixty);
//!     let storage = LocalStorage::new(&config.media_root, config.media_url.clone());
//!     let upload = storage.save("grants.csv", b"id,title\nG1,Roof\n").unwrap();
//!
//!     let schemas = HttpSchemaSource::new(config.schema_timeout()).unwrap();
//!     let explorer = Explorer::new(config, Box::new(storage), schemas, RuleSet::cove());
//!     let response = explorer.explore(&upload.id).await.unwrap();
//!     println!("{} grants", response.grants_aggregates.unwrap().count);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per stage
//! - [`models`] - Uploads, conversions, validation results
//! - [`config`] - Namespace presets and overrides
//! - [`storage`] - Upload storage with retention
//! - [`detect`] - File type detection
//! - [`parser`] - CSV reading/writing with encoding fallback
//! - [`flatten`] - Spreadsheet ⇄ JSON conversion
//! - [`convert`] - Conversion pipeline for one upload
//! - [`validation`] - Schema validation with CoVE's rule overrides
//! - [`aggregates`] - Summary statistics
//! - [`explore`] - End-to-end orchestration

// Core modules
pub mod error;
pub mod models;
pub mod config;

// Storage
pub mod storage;

// Parsing and conversion
pub mod detect;
pub mod parser;
pub mod flatten;
pub mod convert;

// Validation
pub mod validation;

// Statistics
pub mod aggregates;

// Orchestration
pub mod explore;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    ConversionFailure,
    ConversionFailureKind,
    DetectError,
    ExploreError,
    FailureKind,
    FlattenError,
    SchemaError,
    StorageError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Conversion,
    ConversionResult,
    ConvertedArtifact,
    FileType,
    Shape,
    UploadedArtifact,
    ValidationErrorSet,
};

// =============================================================================
// Re-exports - Configuration and storage
// =============================================================================

pub use config::{CoveConfig, Namespace, SchemaUrl};
pub use storage::{LocalStorage, Storage, DEFAULT_RETENTION_DAYS};

// =============================================================================
// Re-exports - Detection and conversion
// =============================================================================

pub use detect::{detect_artifact, detect_file_type};
pub use flatten::{FlattenOptions, Flattener, SheetFlattener, UnflattenOptions};
pub use convert::{convert_json_to_tabular, convert_tabular_to_json, ConversionContext};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{
    get_schema_validation_errors,
    validate,
    HttpSchemaSource,
    RuleSet,
    SchemaSource,
    SchemaValidator,
    StaticSchemaSource,
};

// =============================================================================
// Re-exports - Aggregates
// =============================================================================

pub use aggregates::{
    aggregate,
    Aggregates,
    GrantsAggregate,
    RecordsAggregate,
    ReleasesAggregate,
};

// =============================================================================
// Re-exports - Explore
// =============================================================================

pub use explore::{
    error_response,
    ErrorResponse,
    ExploreResponse,
    Explorer,
};
