//! Per-namespace configuration.
//!
//! A namespace selects which standard the tool speaks:
//!
//! | Namespace   | Main sheet | Root id | Titles | Package schema       |
//! |-------------|------------|---------|--------|----------------------|
//! | `cove-ocds` | releases   | ocid    | no     | release / record     |
//! | `cove-360`  | grants     |         | yes    | none                 |
//! | `default`   | main       |         | no     | none                 |
//!
//! Settings come from, in order: the namespace preset, an optional JSON
//! override file, then `COVE_*` environment variables (a `.env` file is read
//! first if present).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::Shape;
use crate::storage::DEFAULT_RETENTION_DAYS;
use crate::validation::DEFAULT_SCHEMA_TIMEOUT;

/// Which data standard an instance serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Namespace {
    #[serde(rename = "cove-ocds")]
    Ocds,
    #[serde(rename = "cove-360")]
    ThreeSixty,
    #[serde(rename = "default")]
    Default,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Ocds => "cove-ocds",
            Namespace::ThreeSixty => "cove-360",
            Namespace::Default => "default",
        }
    }

    /// Shape the namespace computes statistics for, if any.
    ///
    /// OCDS documents are record packages when they carry `records`.
    pub fn shape_for(&self, document: &Value) -> Option<Shape> {
        match self {
            Namespace::Ocds if has_records(document) => Some(Shape::Records),
            Namespace::Ocds => Some(Shape::Releases),
            Namespace::ThreeSixty => Some(Shape::Grants),
            Namespace::Default => None,
        }
    }

    /// Whether a JSON upload should be exported as a spreadsheet.
    pub fn exports_json(&self, document: &Value) -> bool {
        !(matches!(self, Namespace::Ocds) && has_records(document))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cove-ocds" | "ocds" => Ok(Namespace::Ocds),
            "cove-360" | "360" => Ok(Namespace::ThreeSixty),
            "default" | "" => Ok(Namespace::Default),
            other => Err(ConfigError::UnknownNamespace(other.to_string())),
        }
    }
}

fn has_records(document: &Value) -> bool {
    document.get("records").is_some()
}

/// Package schema location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaUrl {
    /// One schema for every document.
    Single(String),
    /// Release and record package schemas, chosen per document.
    Package { release: String, record: String },
}

impl SchemaUrl {
    /// The schema that applies to `document`.
    pub fn resolve(&self, document: &Value) -> &str {
        match self {
            SchemaUrl::Single(url) => url,
            SchemaUrl::Package { record, .. } if has_records(document) => record,
            SchemaUrl::Package { release, .. } => release,
        }
    }
}

/// Settings for one running instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoveConfig {
    pub namespace: Namespace,
    /// Package schema documents are validated against.
    pub schema_url: Option<SchemaUrl>,
    /// Schema for a single item (release, grant), used by the converter.
    pub item_schema_url: Option<String>,
    pub main_sheet_name: String,
    pub root_id: String,
    /// Also produce a spreadsheet with title headers when flattening.
    pub convert_titles: bool,
    pub media_root: PathBuf,
    pub media_url: String,
    pub schema_timeout_secs: u64,
    /// `None` keeps uploads forever.
    pub retention_days: Option<i64>,
}

impl Default for CoveConfig {
    fn default() -> Self {
        Self::for_namespace(Namespace::Default)
    }
}

impl CoveConfig {
    /// Built-in settings for a namespace.
    pub fn for_namespace(namespace: Namespace) -> Self {
        let base = Self {
            namespace,
            schema_url: None,
            item_schema_url: None,
            main_sheet_name: "main".to_string(),
            root_id: String::new(),
            convert_titles: false,
            media_root: PathBuf::from("media"),
            media_url: "/media/".to_string(),
            schema_timeout_secs: DEFAULT_SCHEMA_TIMEOUT.as_secs(),
            retention_days: Some(DEFAULT_RETENTION_DAYS),
        };

        match namespace {
            Namespace::Ocds => Self {
                schema_url: Some(SchemaUrl::Package {
                    release: "http://localhost:8002/release-package-schema.json".to_string(),
                    record: "http://localhost:8002/record-package-schema.json".to_string(),
                }),
                item_schema_url: Some("http://localhost:8002/release-schema.json".to_string()),
                main_sheet_name: "releases".to_string(),
                root_id: "ocid".to_string(),
                ..base
            },
            Namespace::ThreeSixty => Self {
                item_schema_url: Some("http://localhost:8001/360-giving-schema.json".to_string()),
                main_sheet_name: "grants".to_string(),
                convert_titles: true,
                ..base
            },
            Namespace::Default => base,
        }
    }

    /// Load settings: `.env`, the preset for `namespace` (or
    /// `COVE_NAMESPACE`), an optional override file, then environment
    /// overrides.
    pub fn load(namespace: Option<Namespace>, override_file: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let namespace = match (namespace, env::var("COVE_NAMESPACE")) {
            (Some(namespace), _) => namespace,
            (None, Ok(value)) => value.parse()?,
            (None, Err(_)) => Namespace::Default,
        };

        let mut config = match override_file {
            Some(path) => Self::from_file(namespace, path)?,
            None => Self::for_namespace(namespace),
        };
        config.apply_env(|name| env::var(name).ok())?;
        Ok(config)
    }

    /// Preset for `namespace` with the fields present in a JSON file replaced.
    pub fn from_file(namespace: Namespace, path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let overrides: Value = serde_json::from_str(&content)?;
        Self::for_namespace(namespace).merge(overrides)
    }

    /// Replace the fields present in `overrides`.
    pub fn merge(self, overrides: Value) -> Result<Self, ConfigError> {
        let mut current = serde_json::to_value(&self)?;
        if let (Value::Object(fields), Value::Object(replacements)) = (&mut current, overrides) {
            fields.extend(replacements);
        }
        Ok(serde_json::from_value(current)?)
    }

    /// Apply `COVE_*` variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("COVE_MEDIA_ROOT") {
            self.media_root = PathBuf::from(root);
        }
        if let Some(url) = lookup("COVE_MEDIA_URL") {
            self.media_url = url;
        }
        if let Some(value) = lookup("COVE_SCHEMA_TIMEOUT_SECS") {
            self.schema_timeout_secs = parse_env("COVE_SCHEMA_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("COVE_RETENTION_DAYS") {
            self.retention_days = match value.trim() {
                "" | "none" | "never" => None,
                days => Some(parse_env("COVE_RETENTION_DAYS", days)?),
            };
        }
        Ok(())
    }

    pub fn schema_timeout(&self) -> Duration {
        Duration::from_secs(self.schema_timeout_secs)
    }

    /// Package schema URL for `document`, if validation is configured.
    pub fn schema_url_for(&self, document: &Value) -> Option<&str> {
        self.schema_url.as_ref().map(|s| s.resolve(document))
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name: name.to_string(),
        value: value.to_string(),
    })
}
