//! Semantic memory search.
//!
//! [`MemorySearch`] is the seam the recall layer queries through. The
//! production implementation, [`GatewaySearch`], calls the gateway's
//! `memory_search` tool (embedding + BM25 hybrid ranking on the server side).

use std::time::Duration;

use async_trait::async_trait;
use pal_types::MemoryHit;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::gateway::{GatewayError, ToolGateway};

/// Remote memory search timeout.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Snippets longer than this many characters are cut.
pub const SNIPPET_CHARS: usize = 200;

/// Errors from a memory search backend.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    /// The tool answered but its payload was not the expected shape.
    #[error("Unexpected search payload: {0}")]
    BadResponse(String),
}

/// A ranked memory lookup.
#[async_trait]
pub trait MemorySearch: Send + Sync {
    /// Return at most `max_results` hits scoring at least `min_score`,
    /// best first.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        min_score: f32,
    ) -> Result<Vec<MemoryHit>, MemoryError>;
}

/// Inner payload of the `memory_search` tool, carried as a JSON string in
/// the first content item.
#[derive(Deserialize, Default)]
struct SearchPayload {
    #[serde(default)]
    results: Vec<RawHit>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHit {
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    path: String,
    #[serde(default = "default_source")]
    source: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    start_line: u32,
    #[serde(default)]
    end_line: u32,
    #[serde(default)]
    citation: String,
}

fn default_source() -> String {
    "memory".to_string()
}

impl From<RawHit> for MemoryHit {
    fn from(raw: RawHit) -> Self {
        MemoryHit {
            text: raw.snippet.chars().take(SNIPPET_CHARS).collect(),
            path: raw.path,
            source: raw.source,
            score: raw.score,
            start_line: raw.start_line,
            end_line: raw.end_line,
            citation: raw.citation,
        }
    }
}

/// [`MemorySearch`] backed by the gateway's `memory_search` tool.
#[derive(Debug, Clone)]
pub struct GatewaySearch {
    gateway: ToolGateway,
}

impl GatewaySearch {
    pub fn new(gateway: ToolGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl MemorySearch for GatewaySearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        min_score: f32,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        let args = json!({
            "query": query,
            "maxResults": max_results,
            "minScore": min_score,
        });
        let texts = self
            .gateway
            .invoke("memory_search", args, SEARCH_TIMEOUT)
            .await?;

        let Some(inner) = texts.into_iter().next() else {
            return Ok(Vec::new());
        };
        let payload: SearchPayload = serde_json::from_str(&inner)
            .map_err(|e| MemoryError::BadResponse(e.to_string()))?;

        debug!(query, hits = payload.results.len(), "memory search answered");
        Ok(payload.results.into_iter().map(MemoryHit::from).collect())
    }
}
