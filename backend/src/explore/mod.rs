//! The end-to-end "explore this upload" operation.
//!
//! ```text
//! open ─▶ detect ─┬─ json ─────▶ parse ──▶ flatten (export) ─┐
//!                 └─ csv/xlsx ─▶ unflatten ──▶ parse ─────────┤
//!                                                             ▼
//!                         validate (if schema) ─▶ aggregate ─▶ ExploreResponse
//! ```
//!
//! A failed export of a JSON upload only sets `conversionError` on the
//! response. Every other failure ends the request with an [`ExploreError`],
//! which [`ErrorResponse`] turns into the user-facing error page.

pub mod response;

use serde_json::Value;
use std::fs;
use tracing::{debug, info, warn};

use crate::aggregates::aggregate;
use crate::config::CoveConfig;
use crate::convert::{convert_json_to_tabular, convert_tabular_to_json, ConversionContext};
use crate::detect::detect_artifact;
use crate::error::{ConversionFailure, ConversionFailureKind, ExploreError, ExploreResult, SchemaError};
use crate::flatten::{Flattener, SheetFlattener};
use crate::models::{Conversion, FileType, UploadedArtifact};
use crate::storage::Storage;
use crate::validation::{get_schema_validation_errors, RuleSet, SchemaSource};

pub use response::{error_response, ErrorBody, ErrorResponse, ExploreResponse, OriginalFile};

/// Runs the explore operation against one storage and schema source.
pub struct Explorer<S: SchemaSource> {
    config: CoveConfig,
    storage: Box<dyn Storage>,
    schemas: S,
    flattener: Box<dyn Flattener>,
    rules: RuleSet,
}

impl<S: SchemaSource> Explorer<S> {
    pub fn new(config: CoveConfig, storage: Box<dyn Storage>, schemas: S, rules: RuleSet) -> Self {
        Self {
            config,
            storage,
            schemas,
            flattener: Box::new(SheetFlattener),
            rules,
        }
    }

    /// Explore the upload stored under `id`.
    pub async fn explore(&self, id: &str) -> ExploreResult<ExploreResponse> {
        let result = self.run(id).await;
        if let Err(err) = &result {
            warn!(id, kind = ?err.kind(), error = %err, "explore failed");
        }
        result
    }

    async fn run(&self, id: &str) -> ExploreResult<ExploreResponse> {
        let artifact = self.storage.open(id)?;
        info!(id, name = %artifact.name, size = artifact.size, "exploring upload");

        let file_type = detect_artifact(&artifact)?;
        debug!(id, file_type = %file_type, "file type detected");

        let upload_dir = self.storage.directory_for(id);
        let upload_url = self.storage.public_url_for(id);
        let original_file = OriginalFile::from_artifact(&artifact, &upload_url);

        let (mut response, document) = match file_type {
            FileType::Json => {
                let document = read_document(&artifact)?;
                let response = ExploreResponse::new(file_type, original_file, Value::Null);

                if !self.config.namespace.exports_json(&document) {
                    debug!(id, "record package, skipping export");
                    (response, document)
                } else {
                    let export = match self.item_schema().await {
                        Ok(schema) => {
                            let ctx = ConversionContext {
                                config: &self.config,
                                upload_dir: &upload_dir,
                                upload_url: &upload_url,
                                schema: schema.as_ref(),
                            };
                            convert_json_to_tabular(&artifact, &ctx, self.flattener.as_ref())
                        }
                        Err(e) => Err(ConversionFailure::conversion(e.to_string())),
                    };
                    match export {
                        Ok(converted) => (response.with_converted(converted), document),
                        Err(failure) if failure.kind == ConversionFailureKind::MalformedInput => {
                            return Err(failure.into())
                        }
                        Err(failure) => (
                            response.with_conversion_error(Conversion::Flatten, failure.message),
                            document,
                        ),
                    }
                }
            }
            FileType::Csv | FileType::Xlsx => {
                let schema = self
                    .item_schema()
                    .await
                    .map_err(|e| ExploreError::Conversion(e.to_string()))?;
                let ctx = ConversionContext {
                    config: &self.config,
                    upload_dir: &upload_dir,
                    upload_url: &upload_url,
                    schema: schema.as_ref(),
                };
                let converted = convert_tabular_to_json(&artifact, file_type, &ctx, self.flattener.as_ref())?;
                let document = read_converted(&converted.path)?;
                (
                    ExploreResponse::new(file_type, original_file, Value::Null).with_converted(converted),
                    document,
                )
            }
        };

        let document = match self.config.schema_url_for(&document).map(str::to_string) {
            Some(schema_url) => {
                let (document, errors) =
                    get_schema_validation_errors(document, &schema_url, &self.schemas, self.rules).await?;
                response = response.with_validation(schema_url, errors);
                document
            }
            None => document,
        };

        if let Some(shape) = self.config.namespace.shape_for(&document) {
            response = response.with_aggregates(aggregate(&document, shape));
        }

        info!(
            id,
            file_type = %file_type,
            validation_messages = response.validation_errors.as_ref().map_or(0, |e| e.len()),
            "explore complete"
        );
        response.json_data = document;
        Ok(response)
    }

    /// Fetch the item schema used by the converter, if one is configured.
    async fn item_schema(&self) -> Result<Option<Value>, SchemaError> {
        match &self.config.item_schema_url {
            Some(url) => self.schemas.fetch(url).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Parse a JSON upload. Bytes that are not UTF-8 JSON are malformed.
fn read_document(artifact: &UploadedArtifact) -> ExploreResult<Value> {
    let bytes = fs::read(&artifact.path)?;
    serde_json::from_slice(&bytes).map_err(|e| ExploreError::MalformedJson(e.to_string()))
}

fn read_converted(path: &std::path::Path) -> ExploreResult<Value> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ExploreError::Conversion(format!("converted output is not JSON: {e}")))
}
