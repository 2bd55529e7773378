pub mod error;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub use error::LockError;

/// Composite keys guarded by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// Serializes one worker's own `next_task` calls for a category.
    Allocation { worker_name: String, category: String },
    /// Serializes status transitions of one worker on one range.
    Status { worker_name: String, log_name: String, start: u64, end: u64 },
}

impl LockKey {
    pub fn allocation(worker_name: &str, category: &str) -> Self {
        LockKey::Allocation { worker_name: worker_name.to_string(), category: category.to_string() }
    }

    pub fn status(worker_name: &str, log_name: &str, start: u64, end: u64) -> Self {
        LockKey::Status { worker_name: worker_name.to_string(), log_name: log_name.to_string(), start, end }
    }
}

/// Process-wide map of lazily created mutexes.
///
/// Entries are never removed; the key space is bounded by the active
/// worker/log/range combinations.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex for `key`, creating it on first access.
    pub fn handle(&self, key: LockKey) -> Arc<Mutex<()>> {
        self.locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).value().clone()
    }

    pub async fn lock(&self, key: LockKey) -> OwnedMutexGuard<()> {
        self.handle(key).lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
