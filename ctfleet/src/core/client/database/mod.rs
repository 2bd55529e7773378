pub mod constant;
pub mod error;
pub mod sqlite;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use error::DatabaseError;
pub use sqlite::SqliteClient;

use crate::types::api::WorkerErrorReport;
use crate::types::batch::{BatchAssignment, BatchKey, BatchStatus, NewAssignment, ProgressUpdate, WorkerLogStats};
use crate::types::certificate::{CertificateRecord, InsertOutcome};
use crate::types::log::{CategoryWeight, CtLog, TreeSize};

/// Trait defining database operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// migrate - Create tables and indexes if they do not exist
    async fn migrate(&self) -> Result<(), DatabaseError>;

    /// upsert_category - Insert a category or update its weight
    async fn upsert_category(&self, category: CategoryWeight) -> Result<(), DatabaseError>;
    async fn list_categories(&self) -> Result<Vec<CategoryWeight>, DatabaseError>;

    /// upsert_log - Register a log. An existing `fetch_completed` flag is kept.
    async fn upsert_log(&self, log: CtLog) -> Result<(), DatabaseError>;
    async fn list_logs(&self) -> Result<Vec<CtLog>, DatabaseError>;
    async fn logs_in_category(&self, category: &str) -> Result<Vec<CtLog>, DatabaseError>;
    async fn get_log(&self, name: &str) -> Result<Option<CtLog>, DatabaseError>;
    async fn mark_log_fetch_completed(&self, name: &str) -> Result<(), DatabaseError>;

    async fn get_tree_size(&self, log_name: &str) -> Result<Option<TreeSize>, DatabaseError>;
    /// record_tree_size - Store a tree size if it is larger than the known one.
    /// Returns whether the stored value changed.
    async fn record_tree_size(&self, log_name: &str, tree_size: u64) -> Result<bool, DatabaseError>;

    /// claim_range - Insert a running row unless the range end is already
    /// running, completed or skipped for the log. The check and the insert
    /// happen in one transaction. Returns `None` when the range was taken.
    async fn claim_range(&self, new: NewAssignment) -> Result<Option<BatchAssignment>, DatabaseError>;
    /// insert_assignment - Insert a row unconditionally
    async fn insert_assignment(&self, new: NewAssignment) -> Result<BatchAssignment, DatabaseError>;
    async fn get_assignment(&self, id: i64) -> Result<Option<BatchAssignment>, DatabaseError>;
    /// assignments_for_range - Every row of a range, newest first
    async fn assignments_for_range(&self, key: &BatchKey) -> Result<Vec<BatchAssignment>, DatabaseError>;
    /// live_assignments - Rows in `running` or `resume_wait`
    async fn live_assignments(&self) -> Result<Vec<BatchAssignment>, DatabaseError>;

    /// claimed_ends - Range ends in `running`, `completed` or `skipped` for a log, strictly after `after`
    async fn claimed_ends(&self, log_name: &str, after: Option<u64>) -> Result<HashSet<u64>, DatabaseError>;
    /// completed_ends - Range ends in `completed` for a log, strictly after `after`
    async fn completed_ends(&self, log_name: &str, after: Option<u64>) -> Result<HashSet<u64>, DatabaseError>;

    /// update_progress - Apply a heartbeat to a row if its status is one of `from`.
    /// Returns whether a row was updated.
    async fn update_progress(
        &self,
        id: i64,
        progress: ProgressUpdate,
        status: BatchStatus,
        from: &[BatchStatus],
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// complete_assignment - Mark a row completed and fold its counters into
    /// `worker_log_stats` in one transaction. A row that is already completed
    /// is left alone and `false` is returned.
    async fn complete_assignment(
        &self,
        id: i64,
        progress: ProgressUpdate,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// transition_status - Compare-and-set on a row's status
    async fn transition_status(&self, id: i64, from: &[BatchStatus], to: BatchStatus) -> Result<bool, DatabaseError>;

    /// count_failures - Rows of a range that ended `dead` or `failed`
    async fn count_failures(&self, key: &BatchKey) -> Result<u64, DatabaseError>;
    /// chronic_ranges - Ranges with more than `threshold` dead/failed rows and
    /// no running, completed or skipped row
    async fn chronic_ranges(&self, threshold: u64) -> Result<Vec<BatchKey>, DatabaseError>;
    /// skip_latest_failure - Mark the newest dead/failed row of a range skipped
    async fn skip_latest_failure(&self, key: &BatchKey) -> Result<bool, DatabaseError>;
    async fn count_running_on_log(&self, log_name: &str) -> Result<u64, DatabaseError>;
    /// recent_failures - Dead/failed rows of a worker on a log last touched at or after `since`
    async fn recent_failures(
        &self,
        worker_name: &str,
        log_name: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, DatabaseError>;

    async fn get_frontier(&self, category: &str, log_name: &str) -> Result<Option<u64>, DatabaseError>;
    /// set_frontier - Store a watermark. The stored value never moves backwards.
    async fn set_frontier(&self, category: &str, log_name: &str, end: u64) -> Result<(), DatabaseError>;

    async fn worker_log_stats(
        &self,
        worker_name: &str,
        log_name: &str,
    ) -> Result<Option<WorkerLogStats>, DatabaseError>;

    /// insert_certificates - Insert in one transaction, falling back to one
    /// row at a time when the uniqueness constraint rejects the batch
    async fn insert_certificates(&self, records: Vec<CertificateRecord>) -> Result<InsertOutcome, DatabaseError>;
    async fn count_certificates(&self) -> Result<u64, DatabaseError>;

    async fn insert_worker_error(&self, report: WorkerErrorReport) -> Result<(), DatabaseError>;
    async fn list_worker_errors(&self, limit: u32) -> Result<Vec<WorkerErrorReport>, DatabaseError>;
}
