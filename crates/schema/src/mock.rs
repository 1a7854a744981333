//! `MockFetcher` — a test double for `SchemaFetcher`.
//!
//! Serves a fixed set of schemas, fails for everything else, and records
//! every URI it was asked for.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::{SchemaError, SchemaFetcher};

/// A fetcher backed by an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    /// URI → schema document.
    pub schemas: HashMap<String, Value>,
    /// All URIs requested (in call order).
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    /// Create a mock serving nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `schema` under `uri`.
    pub fn with(mut self, uri: impl Into<String>, schema: Value) -> Self {
        self.schemas.insert(uri.into(), schema);
        self
    }

    /// URIs requested so far.
    pub fn requested(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SchemaFetcher for MockFetcher {
    async fn fetch(&self, uri: &str) -> Result<Value, SchemaError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(uri.to_owned());
        }
        self.schemas
            .get(uri)
            .cloned()
            .ok_or_else(|| SchemaError::NotFound(uri.to_owned()))
    }
}
