//! JSON Schema validation with CoVE's rule overrides.
//!
//! Documents are checked with Draft 4 semantics, except:
//!
//! - `uniqueItems` compares arrays of identified objects by `id` only
//!   (see [`unique`]),
//! - `patternProperties` validates nothing, but its patterns still decide
//!   which keys `additionalProperties` treats as additional.
//!
//! Which overrides apply is an explicit [`RuleSet`] value, built once and
//! handed to every validator. Errors are grouped by message into a
//! [`ValidationErrorSet`].
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use cove::validation::{validate, RuleSet};
//!
//! let schema = json!({
//!     "type": "object",
//!     "properties": { "releases": { "type": "array", "uniqueItems": true } }
//! });
//! let doc = json!({ "releases": [{ "id": "x" }, { "id": "x" }] });
//!
//! let errors = validate(&doc, &schema, &RuleSet::cove()).unwrap();
//! assert_eq!(errors.get("Non-unique Id Values x").unwrap(), &["releases".to_string()]);
//! ```

pub mod fetch;
mod unique;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{SchemaError, SchemaResult};
use crate::models::ValidationErrorSet;

pub use fetch::{HttpSchemaSource, SchemaSource, StaticSchemaSource, DEFAULT_SCHEMA_TIMEOUT};

/// Keyword overrides applied on top of Draft 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSet {
    /// Replace `uniqueItems` with the id-aware check.
    pub unique_ids: bool,
    /// Give `patternProperties` no validation effect.
    pub ignore_pattern_properties: bool,
}

impl RuleSet {
    /// The rules CoVE validates uploads with.
    pub fn cove() -> Self {
        Self {
            unique_ids: true,
            ignore_pattern_properties: true,
        }
    }

    /// Plain Draft 4.
    pub fn standard() -> Self {
        Self {
            unique_ids: false,
            ignore_pattern_properties: false,
        }
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::cove()
    }
}

/// A compiled schema.
pub struct SchemaValidator {
    validator: jsonschema::Validator,
}

impl SchemaValidator {
    /// Compile `schema` under `rules`.
    ///
    /// Remote `$ref`s are downloaded with a blocking client, so call this off
    /// the async runtime.
    pub fn new(schema: &Value, rules: &RuleSet) -> SchemaResult<Self> {
        let mut options = jsonschema::draft4::options().should_validate_formats(false);
        if rules.unique_ids {
            options = options.with_keyword("uniqueItems", unique::unique_ids_factory);
        }

        let validator = if rules.ignore_pattern_properties {
            let mut schema = schema.clone();
            neutralise_pattern_properties(&mut schema);
            options.build(&schema)
        } else {
            options.build(schema)
        }
        .map_err(|e| SchemaError::Invalid(e.to_string()))?;

        Ok(Self { validator })
    }

    /// Every error in `document`, grouped by message.
    pub fn validate(&self, document: &Value) -> ValidationErrorSet {
        let mut errors = ValidationErrorSet::new();
        for error in self.validator.iter_errors(document) {
            let path = error
                .instance_path()
                .iter()
                .map(|segment| segment.to_string())
                .collect::<Vec<_>>()
                .join("/");
            errors.record(error.to_string(), path);
        }
        errors
    }
}

/// Compile `schema` and validate `document` against it.
pub fn validate(document: &Value, schema: &Value, rules: &RuleSet) -> SchemaResult<ValidationErrorSet> {
    Ok(SchemaValidator::new(schema, rules)?.validate(document))
}

/// Fetch the schema at `schema_url` and validate `document` against it.
///
/// Compilation and validation run on the blocking pool; the document is
/// handed back alongside the errors.
pub async fn get_schema_validation_errors<S: SchemaSource>(
    document: Value,
    schema_url: &str,
    source: &S,
    rules: RuleSet,
) -> SchemaResult<(Value, ValidationErrorSet)> {
    let schema = source.fetch(schema_url).await?;
    debug!(schema_url, "schema fetched");

    let (document, result) = tokio::task::spawn_blocking(move || {
        let result = validate(&document, &schema, &rules);
        (document, result)
    })
    .await
    .map_err(|e| SchemaError::Invalid(format!("validation task failed: {e}")))?;

    let errors = result?;
    info!(
        schema_url,
        messages = errors.len(),
        occurrences = errors.occurrences(),
        "validated document"
    );
    Ok((document, errors))
}

/// Replace every `patternProperties` sub-schema with the empty schema.
///
/// The patterns themselves stay, so `additionalProperties` still sees
/// matching keys as declared. Keys of `properties`, `definitions` and
/// `dependencies` are names, not keywords.
fn neutralise_pattern_properties(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            for (keyword, value) in map.iter_mut() {
                match (keyword.as_str(), value) {
                    ("patternProperties", Value::Object(patterns)) => {
                        for sub in patterns.values_mut() {
                            *sub = json!({});
                        }
                    }
                    ("properties" | "definitions" | "dependencies", Value::Object(named)) => {
                        named.values_mut().for_each(neutralise_pattern_properties)
                    }
                    ("enum" | "default" | "example", _) => {}
                    (_, value) => neutralise_pattern_properties(value),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(neutralise_pattern_properties),
        _ => {}
    }
}
