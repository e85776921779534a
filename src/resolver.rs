//! URI resolution boundary
//!
//! Model- and pipeline-install messages may carry a URI instead of the
//! blob itself; the coordinator fetches the bytes through this seam.
//! Fetches are synchronous from the dispatch path's point of view and
//! never retried — a failed fetch is a hard failure of the enclosing
//! dispatch.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Fetch a byte blob given a URI
#[async_trait]
pub trait UriResolver: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>>;
}

// ─────────────────────────────────────────────────────────────────
// HTTP Resolver
// ─────────────────────────────────────────────────────────────────

/// Resolver for `http`, `https` and `file` URIs
pub struct HttpResolver {
    client: reqwest::Client,
}

impl HttpResolver {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UriResolver for HttpResolver {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        let parsed = Url::parse(uri)
            .map_err(|e| Error::invalid_parameter(format!("malformed URI '{}': {}", uri, e)))?;

        match parsed.scheme() {
            "http" | "https" => {
                let response = self
                    .client
                    .get(parsed)
                    .send()
                    .await
                    .map_err(|e| Error::fetch(uri, e.to_string()))?;
                if !response.status().is_success() {
                    return Err(Error::fetch(uri, format!("HTTP {}", response.status())));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| Error::fetch(uri, e.to_string()))?;
                debug!(uri = %uri, bytes = bytes.len(), "Fetched URI");
                Ok(bytes.to_vec())
            }
            "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|_| Error::invalid_parameter(format!("bad file URI '{}'", uri)))?;
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| Error::file_read(path, e))
            }
            other => Err(Error::Unsupported(format!("URI scheme '{}'", other))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Mock Resolver (for testing)
// ─────────────────────────────────────────────────────────────────

/// Resolver serving from an in-memory map
#[derive(Default)]
pub struct MockResolver {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the bytes a URI resolves to
    pub fn insert(&self, uri: impl Into<String>, bytes: Vec<u8>) {
        self.entries.write().insert(uri.into(), bytes);
    }
}

#[async_trait]
impl UriResolver for MockResolver {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        self.entries
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::fetch(uri, "no mock entry"))
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
