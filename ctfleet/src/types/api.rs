//! Request and response bodies exchanged between workers and the manager.

use ctfleet_entry_parser::ParsedCertificate;
use serde::{Deserialize, Serialize};

use crate::types::batch::{BatchKey, BatchStatus, ProgressUpdate};

pub const ALL_LOGS_COMPLETED: &str = "all logs completed";

/// An assigned batch as returned by `next_task`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BatchDescriptor {
    pub log_name: String,
    pub ct_log_url: String,
    pub start: u64,
    pub end: u64,
    /// Last index known to exist in the log when the batch was handed out.
    pub sth_end: u64,
    pub request_interval_sec: f64,
}

impl BatchDescriptor {
    pub fn key(&self) -> BatchKey {
        BatchKey::new(self.log_name.clone(), self.start, self.end)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum NextTaskResponse {
    Assigned(BatchDescriptor),
    AllCompleted { message: String, sleep_sec: u64 },
}

/// Body of `ping`, `completed`, `failed` and `resume_request`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub worker_name: String,
    pub log_name: String,
    pub start: u64,
    pub end: u64,
    pub current: u64,
    #[serde(default)]
    pub status: Option<BatchStatus>,
    #[serde(default)]
    pub jp_count: u64,
    #[serde(default)]
    pub jp_ratio: f64,
    #[serde(default)]
    pub last_uploaded_index: Option<u64>,
    #[serde(default)]
    pub total_retries: u64,
    #[serde(default)]
    pub max_retry_after: u64,
    /// Only needed when the manager has never seen the range.
    #[serde(default)]
    pub ct_log_url: Option<String>,
}

impl StatusReport {
    pub fn key(&self) -> BatchKey {
        BatchKey::new(self.log_name.clone(), self.start, self.end)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.worker_name.trim().is_empty() {
            return Err("worker_name must not be empty".to_string());
        }
        if self.log_name.trim().is_empty() {
            return Err("log_name must not be empty".to_string());
        }
        if self.end < self.start {
            return Err(format!("end {} is before start {}", self.end, self.start));
        }
        if self.current < self.start || self.current > self.end.saturating_add(1) {
            return Err(format!("current {} is outside [{}, {}]", self.current, self.start, self.end.saturating_add(1)));
        }
        Ok(())
    }

    pub fn progress(&self, ip_address: Option<String>) -> ProgressUpdate {
        ProgressUpdate {
            current: self.current,
            last_uploaded_index: self.last_uploaded_index,
            jp_count: self.jp_count,
            jp_ratio: self.jp_ratio,
            total_retries: self.total_retries,
            max_retry_after: self.max_retry_after,
            ip_address,
        }
    }
}

/// Advisory values the worker adopts after each heartbeat.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PingResponse {
    pub ping_interval_sec: u64,
    pub request_interval_sec: f64,
    pub overdue_threshold_sec: u64,
    pub overdue_sleep_sec: u64,
    /// Non-zero means stop the batch now and sleep this long.
    pub kill_now_sleep_sec: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FailedResponse {
    pub failed_sleep_sec: u64,
}

/// One interesting certificate found by a worker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UploadItem {
    pub entry: ParsedCertificate,
    pub log_name: String,
    pub ct_log_url: String,
    pub worker_name: String,
    pub index: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadResponse {
    pub inserted: u64,
    pub skipped_duplicates: u64,
    #[serde(default)]
    pub rejected: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CategoriesResponse {
    pub all_categories: Vec<String>,
    pub ordered_categories: Vec<String>,
}

/// A structured error event raised by a worker's execution loop.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WorkerErrorReport {
    pub worker_name: String,
    pub log_name: String,
    pub start: u64,
    pub end: u64,
    pub error_type: String,
    pub message: String,
}
