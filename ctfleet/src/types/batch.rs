use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of one batch assignment.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchStatus {
    /// Claimed and heartbeating.
    Running,
    /// The worker finished with the range. A cursor short of `end + 1` means
    /// the log would not serve the rest yet, and the range stays open.
    Completed,
    /// The worker stopped early on purpose; the range can be claimed again.
    ResumeWait,
    /// The owning worker stopped heartbeating.
    Dead,
    /// Abandoned after too many dead/failed outcomes. Never handed out again.
    Skipped,
    /// The worker gave up on the range explicitly.
    Failed,
}

impl BatchStatus {
    /// States that still belong to a worker and are swept by the liveness monitor.
    pub const LIVE: [BatchStatus; 2] = [BatchStatus::Running, BatchStatus::ResumeWait];
    /// Outcomes that count towards skipping a range.
    pub const FAILURES: [BatchStatus; 2] = [BatchStatus::Dead, BatchStatus::Failed];

    pub fn is_live(self) -> bool {
        Self::LIVE.contains(&self)
    }
}

/// Identifies a batch independently of who holds it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub log_name: String,
    pub start: u64,
    pub end: u64,
}

impl BatchKey {
    pub fn new(log_name: impl Into<String>, start: u64, end: u64) -> Self {
        Self { log_name: log_name.into(), start, end }
    }
}

impl std::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}..={}]", self.log_name, self.start, self.end)
    }
}

/// One persisted `worker_status` row.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BatchAssignment {
    pub id: i64,
    pub worker_name: String,
    pub log_name: String,
    pub ct_log_url: String,
    pub start: u64,
    pub end: u64,
    /// Next index to fetch, `start <= current <= end + 1`.
    pub current: u64,
    pub status: BatchStatus,
    pub last_ping: Option<DateTime<Utc>>,
    pub last_uploaded_index: Option<u64>,
    pub jp_count: u64,
    pub jp_ratio: f64,
    pub total_retries: u64,
    pub max_retry_after: u64,
    pub duration_sec: Option<f64>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BatchAssignment {
    pub fn key(&self) -> BatchKey {
        BatchKey::new(self.log_name.clone(), self.start, self.end)
    }
}

/// Values for a row about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAssignment {
    pub worker_name: String,
    pub log_name: String,
    pub ct_log_url: String,
    pub start: u64,
    pub end: u64,
    pub current: u64,
    pub status: BatchStatus,
    pub ip_address: Option<String>,
}

/// Progress fields a worker reports with every status call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub current: u64,
    pub last_uploaded_index: Option<u64>,
    pub jp_count: u64,
    pub jp_ratio: f64,
    pub total_retries: u64,
    pub max_retry_after: u64,
    pub ip_address: Option<String>,
}

/// Lifetime counters per (worker, log), folded only on completion.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerLogStats {
    pub worker_name: String,
    pub log_name: String,
    pub completed_batches: u64,
    pub jp_count_total: u64,
    pub entries_total: u64,
}
