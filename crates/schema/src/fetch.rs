//! The `SchemaFetcher` trait and a directory-backed implementation.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::SchemaError;

/// Loads a remote schema document by URI.
///
/// Fetching happens once per scenario version, in
/// [`crate::ValidationContext::compile`]; validation itself is synchronous.
#[async_trait]
pub trait SchemaFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Value, SchemaError>;
}

/// Serves schemas from a local directory, keyed by the last path segment of
/// the URI (`https://example.com/schemas/person.json` → `<dir>/person.json`).
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    dir: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SchemaFetcher for DirectoryFetcher {
    async fn fetch(&self, uri: &str) -> Result<Value, SchemaError> {
        let name = uri
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .ok_or_else(|| SchemaError::NotFound(uri.to_owned()))?;
        let path = self.dir.join(name);
        debug!("loading schema '{}' from {}", uri, path.display());

        let source = tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SchemaError::NotFound(uri.to_owned())
            } else {
                SchemaError::Io {
                    uri: uri.to_owned(),
                    message: e.to_string(),
                }
            }
        })?;
        serde_json::from_str(&source).map_err(|e| SchemaError::Parse {
            uri: uri.to_owned(),
            message: e.to_string(),
        })
    }
}

/// A fetcher that knows no schemas. Every remote `$ref` degrades to `{}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFetch;

#[async_trait]
impl SchemaFetcher for NoFetch {
    async fn fetch(&self, uri: &str) -> Result<Value, SchemaError> {
        Err(SchemaError::NotFound(uri.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn directory_fetcher_reads_by_last_segment() {
        let dir = std::env::temp_dir().join(format!("procession-schemas-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("person.json"), r#"{"type":"object"}"#)
            .await
            .unwrap();
        tokio::fs::write(dir.join("broken.json"), "{").await.unwrap();

        let fetcher = DirectoryFetcher::new(&dir);
        assert_eq!(
            fetcher.fetch("https://example.com/schemas/person.json").await.unwrap(),
            json!({ "type": "object" })
        );
        assert!(matches!(
            fetcher.fetch("https://example.com/missing.json").await,
            Err(SchemaError::NotFound(_))
        ));
        assert!(matches!(
            fetcher.fetch("https://example.com/broken.json").await,
            Err(SchemaError::Parse { .. })
        ));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn no_fetch_knows_nothing() {
        assert!(NoFetch.fetch("https://example.com/a.json").await.is_err());
    }
}
