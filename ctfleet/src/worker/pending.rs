//! Crash-safe store for manager calls that could not be delivered.
//!
//! Each request is one JSON file named `{kind}_{unix_millis}_{suffix}.json`.
//! A single retry loop re-sends them; upload files are renamed to
//! `.processing` while in flight so an overlapping scan cannot send them twice.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::ManagerClient;

const JSON_EXTENSION: &str = "json";
const PROCESSING_EXTENSION: &str = "processing";
const CORRUPT_EXTENSION: &str = "corrupt";
const SUFFIX_LEN: usize = 6;

#[derive(Error, Debug)]
pub enum PendingQueueError {
    #[error("Pending queue I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot encode pending request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PendingQueueError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString, strum_macros::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum PendingKind {
    Ping,
    Completed,
    Failed,
    Resume,
    Upload,
    Error,
}

/// One outbound call, replayed verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub url: String,
    pub method: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct PendingQueue {
    dir: PathBuf,
}

impl PendingQueue {
    /// Creates the directory if needed and puts back files a crashed retry
    /// pass left in `.processing`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PendingQueueError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| PendingQueueError::io(&dir, e))?;
        let queue = Self { dir };
        let recovered = queue.recover_processing()?;
        if recovered > 0 {
            info!(recovered, dir = %queue.dir.display(), "Recovered in-flight pending requests");
        }
        Ok(queue)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `request` atomically and returns the file path.
    pub fn save(&self, kind: PendingKind, request: &PendingRequest) -> Result<PathBuf, PendingQueueError> {
        let bytes = serde_json::to_vec(request)?;
        let path = self.dir.join(file_name(kind, Utc::now().timestamp_millis(), &random_suffix()));

        let mut file = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| PendingQueueError::io(&self.dir, e))?;
        file.write_all(&bytes).map_err(|e| PendingQueueError::io(file.path(), e))?;
        file.persist(&path).map_err(|e| PendingQueueError::io(&path, e.error))?;
        debug!(kind = %kind, path = %path.display(), "Request saved for retry");
        Ok(path)
    }

    /// Pending `.json` files, oldest first.
    pub fn list(&self) -> Result<Vec<PathBuf>, PendingQueueError> {
        let mut files = self.files_with_extension(JSON_EXTENSION)?;
        files.sort_by_key(|path| file_timestamp(path));
        Ok(files)
    }

    pub fn len(&self) -> Result<usize, PendingQueueError> {
        Ok(self.list()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, PendingQueueError> {
        Ok(self.len()? == 0)
    }

    /// Re-sends every pending request once. Delivered files are deleted;
    /// failed ones stay for the next pass.
    pub async fn process_pending(&self, client: &ManagerClient) -> Result<ProcessSummary, PendingQueueError> {
        let mut summary = ProcessSummary::default();
        for path in self.list()? {
            let is_upload = kind_of(&path) == Some(PendingKind::Upload);
            let working = if is_upload {
                let processing = path.with_extension(PROCESSING_EXTENSION);
                match std::fs::rename(&path, &processing) {
                    Ok(()) => processing,
                    // Another pass got there first.
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(PendingQueueError::io(&path, e)),
                }
            } else {
                path.clone()
            };

            let request = match read_request(&working) {
                Ok(request) => request,
                Err(e) => {
                    warn!(path = %working.display(), error = %e, "Unreadable pending request set aside");
                    let corrupt = path.with_extension(CORRUPT_EXTENSION);
                    std::fs::rename(&working, &corrupt).map_err(|e| PendingQueueError::io(&working, e))?;
                    summary.failed += 1;
                    continue;
                }
            };

            match client.send_raw(&request.method, &request.url, &request.payload).await {
                Ok(_) => {
                    std::fs::remove_file(&working).map_err(|e| PendingQueueError::io(&working, e))?;
                    summary.sent += 1;
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Pending request still undeliverable");
                    if is_upload {
                        std::fs::rename(&working, &path).map_err(|e| PendingQueueError::io(&working, e))?;
                    }
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Drains the queue every `interval` until `token` is cancelled.
    pub async fn run_retry_loop(
        self: Arc<Self>,
        client: Arc<ManagerClient>,
        interval: Duration,
        token: CancellationToken,
    ) {
        info!(dir = %self.dir.display(), interval_sec = interval.as_secs(), "Pending request retry loop started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            match self.process_pending(&client).await {
                Ok(summary) if summary.sent + summary.failed > 0 => {
                    info!(sent = summary.sent, failed = summary.failed, "Pending requests retried")
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Pending request pass aborted"),
            }
        }
        info!("Pending request retry loop stopped");
    }

    fn recover_processing(&self) -> Result<usize, PendingQueueError> {
        let stuck = self.files_with_extension(PROCESSING_EXTENSION)?;
        for path in &stuck {
            let restored = path.with_extension(JSON_EXTENSION);
            std::fs::rename(path, &restored).map_err(|e| PendingQueueError::io(path, e))?;
        }
        Ok(stuck.len())
    }

    fn files_with_extension(&self, extension: &str) -> Result<Vec<PathBuf>, PendingQueueError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| PendingQueueError::io(&self.dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| PendingQueueError::io(&self.dir, e))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

fn read_request(path: &Path) -> Result<PendingRequest, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}

fn random_suffix() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(SUFFIX_LEN).map(char::from).collect()
}

pub(crate) fn file_name(kind: PendingKind, millis: i64, suffix: &str) -> String {
    format!("{kind}_{millis}_{suffix}.{JSON_EXTENSION}")
}

pub(crate) fn kind_of(path: &Path) -> Option<PendingKind> {
    let stem = path.file_stem()?.to_str()?;
    let mut parts = stem.rsplitn(3, '_');
    let _suffix = parts.next()?;
    let _millis = parts.next()?;
    parts.next()?.parse().ok()
}

fn file_timestamp(path: &Path) -> i64 {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.rsplitn(3, '_').nth(1))
        .and_then(|millis| millis.parse().ok())
        .unwrap_or(i64::MAX)
}
