//! Async client for RFC 6962 Certificate Transparency logs.

mod error;

use std::time::Duration;

use async_trait::async_trait;
use ctfleet_entry_parser::RawLogEntry;
use mockall::automock;
use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

pub use error::CtLogError;

const GET_STH_PATH: &str = "ct/v1/get-sth";
const GET_ENTRIES_PATH: &str = "ct/v1/get-entries";
const NEED_TREE_SIZE_MARKER: &str = "need tree size";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTreeHead {
    pub tree_size: u64,
    pub timestamp: u64,
    #[serde(default)]
    pub sha256_root_hash: String,
    #[serde(default)]
    pub tree_head_signature: String,
}

#[derive(Debug, Deserialize)]
struct GetEntriesResponse {
    entries: Vec<RawLogEntry>,
}

/// Result of a `get-entries` call that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Possibly fewer entries than requested, possibly none.
    Entries(Vec<RawLogEntry>),
    /// The log refused the range because it is past the tree size it is
    /// willing to serve. Callers treat the batch as complete for now.
    NeedTreeSize,
}

/// Read access to a CT log.
#[automock]
#[async_trait]
pub trait CtLogSource: Send + Sync {
    async fn get_sth(&self) -> Result<SignedTreeHead, CtLogError>;

    /// Fetches entries `[start, end]` (inclusive). The request is clipped to
    /// the client's page size, so the caller must advance by what it got.
    async fn get_entries(&self, start: u64, end: u64) -> Result<FetchOutcome, CtLogError>;
}

#[derive(Debug, Clone)]
pub struct CtLogClient {
    client: reqwest::Client,
    base_url: Url,
    max_page_size: u64,
}

impl CtLogClient {
    pub fn new(base_url: &str, max_page_size: u64) -> Result<Self, CtLogError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| CtLogError::Network { operation: "build_client", message: e.to_string() })?;
        Self::with_client(client, base_url, max_page_size)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, max_page_size: u64) -> Result<Self, CtLogError> {
        // Url::join drops the last path segment unless it ends with a slash.
        let normalized = if base_url.ends_with('/') { base_url.to_string() } else { format!("{base_url}/") };
        let base_url = Url::parse(&normalized).map_err(|e| CtLogError::Url(format!("{base_url}: {e}")))?;
        Ok(Self { client, base_url, max_page_size: max_page_size.max(1) })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, CtLogError> {
        self.base_url.join(path).map_err(|e| CtLogError::Url(e.to_string()))
    }

    async fn classify(operation: &'static str, response: Response) -> Result<Response, CtLogError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(CtLogError::RateLimited { operation, retry_after });
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(CtLogError::Server { operation, status, body })
        } else {
            Err(CtLogError::Client { operation, status, body })
        }
    }
}

#[async_trait]
impl CtLogSource for CtLogClient {
    async fn get_sth(&self) -> Result<SignedTreeHead, CtLogError> {
        let url = self.endpoint(GET_STH_PATH)?;
        trace!(%url, "Requesting STH");
        let response =
            self.client.get(url).send().await.map_err(|e| CtLogError::from_reqwest("get_sth", e))?;
        let response = Self::classify("get_sth", response).await?;
        response.json::<SignedTreeHead>().await.map_err(|e| CtLogError::Decode { operation: "get_sth", message: e.to_string() })
    }

    async fn get_entries(&self, start: u64, end: u64) -> Result<FetchOutcome, CtLogError> {
        if end < start {
            return Ok(FetchOutcome::Entries(Vec::new()));
        }
        let end = end.min(start.saturating_add(self.max_page_size - 1));
        let url = self.endpoint(GET_ENTRIES_PATH)?;
        let response = self
            .client
            .get(url)
            .query(&[("start", start), ("end", end)])
            .send()
            .await
            .map_err(|e| CtLogError::from_reqwest("get_entries", e))?;

        match Self::classify("get_entries", response).await {
            Ok(response) => {
                let parsed = response
                    .json::<GetEntriesResponse>()
                    .await
                    .map_err(|e| CtLogError::Decode { operation: "get_entries", message: e.to_string() })?;
                debug!(start, end, received = parsed.entries.len(), "Fetched log entries");
                Ok(FetchOutcome::Entries(parsed.entries))
            }
            Err(CtLogError::Client { body, .. }) if body.to_ascii_lowercase().contains(NEED_TREE_SIZE_MARKER) => {
                debug!(start, end, "Log asked for a tree size, treating range as complete for now");
                Ok(FetchOutcome::NeedTreeSize)
            }
            Err(e) => Err(e),
        }
    }
}
