use thiserror::Error;

use crate::core::client::database::DatabaseError;
use crate::core::client::lock::LockError;
use crate::worker::client::ManagerClientError;
use crate::worker::pending::PendingQueueError;

/// Result type for ctfleet operations
pub type FleetResult<T> = Result<T, FleetError>;

/// Error types for ctfleet
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Manager client error: {0}")]
    ManagerClient(#[from] ManagerClientError),

    #[error("Pending queue error: {0}")]
    PendingQueue(#[from] PendingQueueError),

    #[error("CT log error: {0}")]
    CtLog(#[from] ctfleet_ct_log_client::CtLogError),

    /// A request carried values that can never be valid.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Unknown log: {0}")]
    UnknownLog(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ctfleet error: {0}")]
    Anyhow(#[from] anyhow::Error),
}
