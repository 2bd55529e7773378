use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

use super::pending::{PendingKind, PendingQueue, PendingRequest};
use crate::types::api::{
    CategoriesResponse, FailedResponse, MessageResponse, NextTaskResponse, PingResponse, StatusReport, UploadItem,
    UploadResponse, WorkerErrorReport,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ManagerClientError {
    #[error("Request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("Manager answered {status} for {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Cannot decode manager response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Invalid manager URL: {0}")]
    Url(String),

    #[error("Unsupported method: {0}")]
    Method(String),

    #[error("Request could not be delivered nor saved for retry: {0}")]
    NotPersisted(String),
}

impl ManagerClientError {
    /// Failures a later retry may fix: the manager was unreachable or errored.
    pub fn is_transient(&self) -> bool {
        match self {
            ManagerClientError::Network { .. } => true,
            ManagerClientError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result of a call the worker must not lose.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<T> {
    Delivered(T),
    /// The manager was unreachable; the request waits in the pending queue.
    Queued,
}

impl<T> Delivery<T> {
    pub fn delivered(self) -> Option<T> {
        match self {
            Delivery::Delivered(value) => Some(value),
            Delivery::Queued => None,
        }
    }
}

/// HTTP client for the manager API.
///
/// Status reports, uploads and error events fall back to the pending queue
/// when the manager cannot be reached. `next_task` and `categories` do not:
/// their answers are only useful right now.
#[derive(Debug)]
pub struct ManagerClient {
    http: reqwest::Client,
    base_url: Url,
    pending: Arc<PendingQueue>,
    consecutive_failures: AtomicU32,
}

impl ManagerClient {
    pub fn new(mut base_url: Url, pending: Arc<PendingQueue>) -> Result<Self, ManagerClientError> {
        // Url::join replaces the last segment unless the path ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ManagerClientError::Network { url: base_url.to_string(), message: e.to_string() })?;
        Ok(Self { http, base_url, pending, consecutive_failures: AtomicU32::new(0) })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn pending(&self) -> &Arc<PendingQueue> {
        &self.pending
    }

    /// Transient failures since the last successful call.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub async fn next_task(&self, worker_name: &str, category: &str) -> Result<NextTaskResponse, ManagerClientError> {
        let mut url = self.endpoint("next_task")?;
        url.query_pairs_mut().append_pair("worker_name", worker_name).append_pair("category", category);
        self.request(Method::GET, url, None).await
    }

    pub async fn categories(&self, worker_name: &str) -> Result<CategoriesResponse, ManagerClientError> {
        let mut url = self.endpoint("categories")?;
        url.query_pairs_mut().append_pair("worker_name", worker_name);
        self.request(Method::GET, url, None).await
    }

    pub async fn ping(&self, report: &StatusReport) -> Result<Delivery<PingResponse>, ManagerClientError> {
        self.deliver(PendingKind::Ping, "ping", report).await
    }

    pub async fn completed(&self, report: &StatusReport) -> Result<Delivery<MessageResponse>, ManagerClientError> {
        self.deliver(PendingKind::Completed, "completed", report).await
    }

    pub async fn failed(&self, report: &StatusReport) -> Result<Delivery<FailedResponse>, ManagerClientError> {
        self.deliver(PendingKind::Failed, "failed", report).await
    }

    pub async fn resume(&self, report: &StatusReport) -> Result<Delivery<MessageResponse>, ManagerClientError> {
        self.deliver(PendingKind::Resume, "resume_request", report).await
    }

    pub async fn upload(&self, items: &[UploadItem]) -> Result<Delivery<UploadResponse>, ManagerClientError> {
        self.deliver(PendingKind::Upload, "upload", &items).await
    }

    pub async fn worker_error(
        &self,
        report: &WorkerErrorReport,
    ) -> Result<Delivery<MessageResponse>, ManagerClientError> {
        self.deliver(PendingKind::Error, "worker_error", report).await
    }

    /// Sends a stored request as-is. Never touches the pending queue.
    pub async fn send_raw(
        &self,
        method: &str,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, ManagerClientError> {
        let method = Method::from_bytes(method.as_bytes()).map_err(|_| ManagerClientError::Method(method.to_string()))?;
        let url = Url::parse(url).map_err(|e| ManagerClientError::Url(format!("{url}: {e}")))?;
        let body = (method != Method::GET).then_some(payload);
        self.request(method, url, body).await
    }

    async fn deliver<B, T>(&self, kind: PendingKind, path: &str, body: &B) -> Result<Delivery<T>, ManagerClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let payload = serde_json::to_value(body)
            .map_err(|e| ManagerClientError::Decode { url: url.to_string(), message: e.to_string() })?;

        match self.request(Method::POST, url.clone(), Some(&payload)).await {
            Ok(response) => Ok(Delivery::Delivered(response)),
            Err(e) if e.is_transient() => {
                let request = PendingRequest { url: url.to_string(), method: Method::POST.to_string(), payload };
                match self.pending.save(kind, &request) {
                    Ok(file) => {
                        warn!(kind = %kind, error = %e, file = %file.display(), "Manager unreachable, request queued");
                        Ok(Delivery::Queued)
                    }
                    Err(save_error) => {
                        error!(kind = %kind, error = %save_error, "Failed to queue undeliverable request");
                        Err(ManagerClientError::NotPersisted(save_error.to_string()))
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<T, ManagerClientError> {
        let url_string = url.to_string();
        let mut builder = self.http.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let result = match builder.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    response.json::<T>().await.map_err(|e| ManagerClientError::Decode {
                        url: url_string.clone(),
                        message: e.to_string(),
                    })
                } else {
                    let body = response.text().await.unwrap_or_default();
                    Err(ManagerClientError::Status { url: url_string.clone(), status: status.as_u16(), body })
                }
            }
            Err(e) => Err(ManagerClientError::Network { url: url_string.clone(), message: e.to_string() }),
        };

        match &result {
            Err(e) if e.is_transient() => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(url = %url_string, failures, "Manager call failed");
            }
            Err(_) => {}
            Ok(_) => self.consecutive_failures.store(0, Ordering::Relaxed),
        }
        result
    }

    fn endpoint(&self, path: &str) -> Result<Url, ManagerClientError> {
        self.base_url.join(path).map_err(|e| ManagerClientError::Url(format!("{}{path}: {e}", self.base_url)))
    }
}
