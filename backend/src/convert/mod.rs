//! Conversion pipeline between uploads and their other representation.
//!
//! - Spreadsheets (CSV, XLSX) are unflattened into `unflattened.json`.
//! - JSON is flattened into `flattened.csv`, plus `flattened-titles.csv`
//!   when the namespace wants title headers.
//!
//! Output goes into the upload's own directory. Both directions return a
//! [`ConversionResult`]; whether a failure aborts the request is left to the
//! caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use cove::convert::{convert_tabular_to_json, ConversionContext};
//! use cove::flatten::SheetFlattener;
//!
//! let ctx = ConversionContext { config: &config, upload_dir: &dir, upload_url: &url, schema: None };
//! match convert_tabular_to_json(&artifact, FileType::Csv, &ctx, &SheetFlattener) {
//!     Ok(converted) => println!("wrote {} bytes", converted.size_bytes),
//!     Err(failure) => eprintln!("{}", failure.message),
//! }
//! ```

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::CoveConfig;
use crate::error::{ConversionFailure, FlattenError};
use crate::flatten::{FlattenOptions, Flattener, UnflattenOptions};
use crate::models::{Conversion, ConversionResult, ConvertedArtifact, FileType, UploadedArtifact};
use crate::parser::{sniff_file_encoding, TextEncoding};

/// Name of the unflattened output.
pub const UNFLATTENED_NAME: &str = "unflattened.json";
/// Name of the flattened output.
pub const FLATTENED_NAME: &str = "flattened.csv";
/// Name of the flattened output with title headers.
pub const FLATTENED_TITLES_NAME: &str = "flattened-titles.csv";
/// Directory a single CSV upload is copied into.
const CSV_DIR: &str = "csv_dir";

/// Where and how to convert one upload.
#[derive(Debug, Clone, Copy)]
pub struct ConversionContext<'a> {
    pub config: &'a CoveConfig,
    /// Directory outputs are written to.
    pub upload_dir: &'a Path,
    /// Public URL of `upload_dir`.
    pub upload_url: &'a str,
    /// Item schema, when one is configured and was fetched.
    pub schema: Option<&'a Value>,
}

impl ConversionContext<'_> {
    fn output(&self, name: &str) -> (PathBuf, String) {
        (
            self.upload_dir.join(name),
            format!("{}/{}", self.upload_url.trim_end_matches('/'), name),
        )
    }
}

/// Convert a CSV or XLSX upload into nested JSON.
///
/// A CSV upload is copied into `csv_dir/<main_sheet_name>.csv` first, and read
/// as UTF-8 if it decodes cleanly, Windows-1252 otherwise.
pub fn convert_tabular_to_json<F: Flattener + ?Sized>(
    artifact: &UploadedArtifact,
    file_type: FileType,
    ctx: &ConversionContext<'_>,
    flattener: &F,
) -> ConversionResult {
    let config = ctx.config;
    let (output, url) = ctx.output(UNFLATTENED_NAME);

    let (input, encoding) = match file_type {
        FileType::Csv => prepare_csv_dir(artifact, ctx).map_err(|e| fail(artifact, e))?,
        FileType::Xlsx => (artifact.path.clone(), TextEncoding::Utf8),
        FileType::Json => {
            return Err(ConversionFailure::conversion(
                "JSON uploads are not spreadsheets",
            ))
        }
    };

    let options = UnflattenOptions {
        input_format: file_type,
        main_sheet_name: config.main_sheet_name.clone(),
        root_id: config.root_id.clone(),
        schema: ctx.schema.cloned(),
        convert_titles: true,
        encoding,
    };

    debug!(id = %artifact.id, input = %input.display(), "unflattening");
    flattener
        .unflatten(&input, &output, &options)
        .map_err(|e| fail(artifact, e))?;

    let size_bytes = file_size(&output).map_err(|e| fail(artifact, e))?;
    info!(id = %artifact.id, file_type = %file_type, size_bytes, "converted spreadsheet to JSON");

    Ok(ConvertedArtifact {
        conversion: Conversion::Unflatten,
        path: output,
        url,
        size_bytes,
        titled_size_bytes: None,
    })
}

fn prepare_csv_dir(
    artifact: &UploadedArtifact,
    ctx: &ConversionContext<'_>,
) -> Result<(PathBuf, TextEncoding), FlattenError> {
    let csv_dir = ctx.upload_dir.join(CSV_DIR);
    fs::create_dir_all(&csv_dir)?;

    let destination = csv_dir.join(format!("{}.csv", ctx.config.main_sheet_name));
    fs::copy(&artifact.path, &destination)?;

    let encoding = sniff_file_encoding(&destination)?;
    if encoding != TextEncoding::Utf8 {
        debug!(id = %artifact.id, %encoding, "upload is not UTF-8");
    }
    Ok((csv_dir, encoding))
}

/// Convert a JSON upload into a spreadsheet.
///
/// Input that is not well formed JSON fails with
/// [`crate::error::ConversionFailureKind::MalformedInput`].
pub fn convert_json_to_tabular<F: Flattener + ?Sized>(
    artifact: &UploadedArtifact,
    ctx: &ConversionContext<'_>,
    flattener: &F,
) -> ConversionResult {
    let config = ctx.config;
    let (output, url) = ctx.output(FLATTENED_NAME);

    let mut options = FlattenOptions {
        main_sheet_name: config.main_sheet_name.clone(),
        root_list_path: config.main_sheet_name.clone(),
        root_id: config.root_id.clone(),
        schema: ctx.schema.cloned(),
        use_titles: false,
    };

    flattener
        .flatten(&artifact.path, &output, &options)
        .map_err(|e| fail(artifact, e))?;
    let size_bytes = file_size(&output).map_err(|e| fail(artifact, e))?;

    let titled_size_bytes = if config.convert_titles {
        let (titled, _) = ctx.output(FLATTENED_TITLES_NAME);
        options.use_titles = true;
        flattener
            .flatten(&artifact.path, &titled, &options)
            .map_err(|e| fail(artifact, e))?;
        Some(file_size(&titled).map_err(|e| fail(artifact, e))?)
    } else {
        None
    };

    info!(id = %artifact.id, size_bytes, titled = titled_size_bytes.is_some(), "converted JSON to spreadsheet");

    Ok(ConvertedArtifact {
        conversion: Conversion::Flatten,
        path: output,
        url,
        size_bytes,
        titled_size_bytes,
    })
}

fn file_size(path: &Path) -> Result<u64, FlattenError> {
    Ok(fs::metadata(path)?.len())
}

fn fail(artifact: &UploadedArtifact, err: FlattenError) -> ConversionFailure {
    warn!(id = %artifact.id, name = %artifact.name, error = %err, "conversion failed");
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Namespace;
    use crate::error::ConversionFailureKind;
    use crate::flatten::SheetFlattener;
    use tempfile::TempDir;

    fn upload(dir: &TempDir, name: &str, bytes: &[u8]) -> UploadedArtifact {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        UploadedArtifact {
            id: "test".into(),
            name: name.into(),
            path,
            size: bytes.len() as u64,
        }
    }

    fn context<'a>(config: &'a CoveConfig, dir: &'a TempDir) -> ConversionContext<'a> {
        ConversionContext {
            config,
            upload_dir: dir.path(),
            upload_url: "/media/test",
            schema: None,
        }
    }

    #[test]
    fn test_csv_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoveConfig::for_namespace(Namespace::ThreeSixty);
        let artifact = upload(&dir, "upload.csv", b"id,title\nG1,Roof\nG2,Hall\n");

        let converted =
            convert_tabular_to_json(&artifact, FileType::Csv, &context(&config, &dir), &SheetFlattener).unwrap();

        assert_eq!(converted.conversion, Conversion::Unflatten);
        assert_eq!(converted.url, "/media/test/unflattened.json");
        assert!(dir.path().join("csv_dir/grants.csv").is_file());

        let document: Value = serde_json::from_slice(&std::fs::read(&converted.path).unwrap()).unwrap();
        assert_eq!(document["grants"][1]["title"], "Hall");
        assert_eq!(converted.size_bytes, std::fs::metadata(&converted.path).unwrap().len());
    }

    #[test]
    fn test_cp1252_csv_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoveConfig::for_namespace(Namespace::ThreeSixty);
        let artifact = upload(&dir, "upload.csv", b"id,title\nG1,Soci\xe9t\xe9\n");

        let converted =
            convert_tabular_to_json(&artifact, FileType::Csv, &context(&config, &dir), &SheetFlattener).unwrap();
        let document: Value = serde_json::from_slice(&std::fs::read(&converted.path).unwrap()).unwrap();
        assert_eq!(document["grants"][0]["title"], "Société");
    }

    #[test]
    fn test_bad_workbook_is_conversion_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoveConfig::default();
        let artifact = upload(&dir, "upload.xlsx", b"PK not really");

        let failure =
            convert_tabular_to_json(&artifact, FileType::Xlsx, &context(&config, &dir), &SheetFlattener).unwrap_err();
        assert_eq!(failure.kind, ConversionFailureKind::ConversionError);
    }

    #[test]
    fn test_json_to_csv_with_titles() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoveConfig::for_namespace(Namespace::ThreeSixty);
        let artifact = upload(&dir, "upload.json", br#"{"grants": [{"id": "G1", "amountAwarded": 5}]}"#);

        let converted = convert_json_to_tabular(&artifact, &context(&config, &dir), &SheetFlattener).unwrap();

        assert_eq!(converted.conversion, Conversion::Flatten);
        assert_eq!(converted.url, "/media/test/flattened.csv");
        assert!(converted.titled_size_bytes.is_some());
        assert!(dir.path().join(FLATTENED_TITLES_NAME).is_file());

        let csv = std::fs::read_to_string(&converted.path).unwrap();
        assert!(csv.starts_with("id,amountAwarded"));
    }

    #[test]
    fn test_json_to_csv_without_titles() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoveConfig::for_namespace(Namespace::Ocds);
        let artifact = upload(&dir, "upload.json", br#"{"releases": [{"ocid": "ocds-1"}]}"#);

        let converted = convert_json_to_tabular(&artifact, &context(&config, &dir), &SheetFlattener).unwrap();
        assert_eq!(converted.titled_size_bytes, None);
        assert!(!dir.path().join(FLATTENED_TITLES_NAME).exists());
    }

    #[test]
    fn test_malformed_json_is_malformed_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoveConfig::default();
        let artifact = upload(&dir, "upload.json", b"{\"main\": [");

        let failure = convert_json_to_tabular(&artifact, &context(&config, &dir), &SheetFlattener).unwrap_err();
        assert_eq!(failure.kind, ConversionFailureKind::MalformedInput);
        assert!(failure.message.contains("EOF"));
    }
}
