//! Serialisable results of the explore operation.
//!
//! [`ExploreResponse`] carries everything a results page shows. Failures
//! become an [`ErrorResponse`]: a status code plus the `{subTitle, linkText,
//! msg}` body of the error page.

use serde::Serialize;
use serde_json::Value;

use crate::aggregates::{Aggregates, GrantsAggregate, RecordsAggregate, ReleasesAggregate};
use crate::error::{ExploreError, FailureKind};
use crate::models::{Conversion, ConvertedArtifact, FileType, UploadedArtifact, ValidationErrorSet};

/// The original upload as linked from the results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OriginalFile {
    pub url: String,
    pub size: u64,
}

/// Successful result of exploring an upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExploreResponse {
    /// Always `"ok"`; error bodies come from [`ErrorResponse`].
    pub status: String,
    pub file_type: FileType,
    pub original_file: OriginalFile,
    /// `None` when no conversion was attempted.
    pub conversion: Option<Conversion>,
    pub converted_url: Option<String>,
    pub converted_file_size: Option<u64>,
    pub converted_file_size_titles: Option<u64>,
    /// Set when a JSON upload could not be exported; the rest of the
    /// response is still valid.
    pub conversion_error: Option<String>,
    pub schema_url: Option<String>,
    /// `None` when no schema is configured.
    pub validation_errors: Option<ValidationErrorSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub releases_aggregates: Option<ReleasesAggregate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_aggregates: Option<RecordsAggregate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grants_aggregates: Option<GrantsAggregate>,
    pub json_data: Value,
}

impl ExploreResponse {
    pub fn new(file_type: FileType, original_file: OriginalFile, json_data: Value) -> Self {
        Self {
            status: "ok".to_string(),
            file_type,
            original_file,
            conversion: None,
            converted_url: None,
            converted_file_size: None,
            converted_file_size_titles: None,
            conversion_error: None,
            schema_url: None,
            validation_errors: None,
            releases_aggregates: None,
            records_aggregates: None,
            grants_aggregates: None,
            json_data,
        }
    }

    pub fn with_converted(mut self, converted: ConvertedArtifact) -> Self {
        self.conversion = Some(converted.conversion);
        self.converted_url = Some(converted.url);
        self.converted_file_size = Some(converted.size_bytes);
        self.converted_file_size_titles = converted.titled_size_bytes;
        self
    }

    /// Record a failed export that did not stop the request.
    pub fn with_conversion_error(mut self, conversion: Conversion, message: String) -> Self {
        self.conversion = Some(conversion);
        self.conversion_error = Some(message);
        self
    }

    pub fn with_validation(mut self, schema_url: String, errors: ValidationErrorSet) -> Self {
        self.schema_url = Some(schema_url);
        self.validation_errors = Some(errors);
        self
    }

    pub fn with_aggregates(mut self, aggregates: Aggregates) -> Self {
        match aggregates {
            Aggregates::Releases(a) => self.releases_aggregates = Some(a),
            Aggregates::Records(a) => self.records_aggregates = Some(a),
            Aggregates::Grants(a) => self.grants_aggregates = Some(a),
        }
        self
    }
}

impl OriginalFile {
    pub fn from_artifact(artifact: &UploadedArtifact, upload_url: &str) -> Self {
        Self {
            url: format!("{}/{}", upload_url.trim_end_matches('/'), artifact.name),
            size: artifact.size,
        }
    }
}

/// Body of the error page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub kind: FailureKind,
    pub sub_title: String,
    pub link_text: String,
    pub msg: String,
}

/// An error body with the HTTP status it is served with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub body: ErrorBody,
}

const NOT_AVAILABLE: &str = "Sorry, the page you are looking for is not available";
const CANNOT_PROCESS: &str = "Sorry we can't process that data";
const HOME: &str = "Go to Home page";
const TRY_AGAIN: &str = "Try Again";

/// Build the user-facing error for a failure kind.
///
/// `detail` is the underlying error message, quoted where the page shows it.
pub fn error_response(kind: FailureKind, detail: &str) -> ErrorResponse {
    let (status, sub_title, link_text, msg) = match kind {
        FailureKind::NotFound => (
            404,
            NOT_AVAILABLE,
            HOME,
            "We don't seem to be able to find the data you requested.".to_string(),
        ),
        FailureKind::Expired => (
            404,
            NOT_AVAILABLE,
            HOME,
            "The data you were hoping to explore no longer exists.\n\n\
             This is because all data suplied to this website is automatically deleted after 7 days, \
             and therefore the analysis of that data is no longer available."
                .to_string(),
        ),
        FailureKind::UnrecognisedFileType => (
            200,
            CANNOT_PROCESS,
            TRY_AGAIN,
            "We did not recognise the file type.\n\nWe can only process json, csv and xlsx files.".to_string(),
        ),
        FailureKind::MalformedJson => (
            200,
            CANNOT_PROCESS,
            TRY_AGAIN,
            format!(
                "We think you tried to upload a JSON file, but it is not well formed JSON.\n\nError message: {}",
                detail
            ),
        ),
        FailureKind::ConversionError => (
            200,
            CANNOT_PROCESS,
            TRY_AGAIN,
            format!(
                "We think you tried to supply a spreadsheet, but we failed to convert it to JSON.\n\nError message: {}",
                detail
            ),
        ),
        FailureKind::SchemaFetchError | FailureKind::Internal => (
            500,
            "Sorry, something went wrong",
            TRY_AGAIN,
            detail.to_string(),
        ),
    };

    ErrorResponse {
        status,
        body: ErrorBody {
            kind,
            sub_title: sub_title.to_string(),
            link_text: link_text.to_string(),
            msg,
        },
    }
}

impl From<&ExploreError> for ErrorResponse {
    fn from(err: &ExploreError) -> Self {
        let detail = match err {
            ExploreError::MalformedJson(message) | ExploreError::Conversion(message) => message.clone(),
            other => other.to_string(),
        };
        error_response(err.kind(), &detail)
    }
}
