//! Where schemas come from.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::{SchemaError, SchemaResult};

/// Default timeout for a schema download.
pub const DEFAULT_SCHEMA_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches a schema document by URL.
pub trait SchemaSource: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = SchemaResult<Value>> + Send;
}

/// Downloads schemas over HTTP. One attempt, no retries.
#[derive(Clone)]
pub struct HttpSchemaSource {
    client: reqwest::Client,
}

impl HttpSchemaSource {
    pub fn new(timeout: Duration) -> SchemaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchemaError::Fetch {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl SchemaSource for HttpSchemaSource {
    async fn fetch(&self, url: &str) -> SchemaResult<Value> {
        debug!(url, "fetching schema");
        let fetch_error = |e: reqwest::Error| SchemaError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(fetch_error)?
            .error_for_status()
            .map_err(fetch_error)?;

        let body = response.text().await.map_err(fetch_error)?;
        serde_json::from_str(&body).map_err(|e| SchemaError::Fetch {
            url: url.to_string(),
            message: format!("response is not JSON: {e}"),
        })
    }
}

/// Serves schemas from memory. Unknown URLs fail like an unreachable host.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemaSource {
    schemas: HashMap<String, Value>,
}

impl StaticSchemaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, url: impl Into<String>, schema: Value) -> Self {
        self.schemas.insert(url.into(), schema);
        self
    }
}

impl SchemaSource for StaticSchemaSource {
    async fn fetch(&self, url: &str) -> SchemaResult<Value> {
        self.schemas.get(url).cloned().ok_or_else(|| SchemaError::Fetch {
            url: url.to_string(),
            message: "no schema registered for this URL".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticSchemaSource::new().with_schema("http://schemas/a.json", json!({ "type": "object" }));

        assert_eq!(source.fetch("http://schemas/a.json").await.unwrap()["type"], "object");
        let err = source.fetch("http://schemas/b.json").await.unwrap_err();
        assert!(matches!(err, SchemaError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_fetch_error() {
        let source = HttpSchemaSource::new(Duration::from_secs(2)).unwrap();
        let err = source.fetch("http://127.0.0.1:9/schema.json").await.unwrap_err();
        match err {
            SchemaError::Fetch { url, .. } => assert_eq!(url, "http://127.0.0.1:9/schema.json"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
