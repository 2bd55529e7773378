//! Manager-side services. Each service is a unit struct whose associated
//! functions take the shared [`ManagerConfig`](crate::core::config::ManagerConfig).

pub mod allocator;
pub mod categories;
pub mod frontier;
pub mod ingest;
pub mod liveness;
pub mod rate;
pub mod status;
pub mod tree_size;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::core::config::ManagerConfig;
use liveness::LivenessMonitor;
use tree_size::TreeSizeTracker;

/// Spawns the manager's background loops. They stop when `token` is cancelled.
pub fn spawn_background_tasks(config: Arc<ManagerConfig>, token: CancellationToken) -> Vec<JoinHandle<()>> {
    let liveness = tokio::spawn(
        LivenessMonitor::run(config.clone(), token.child_token()).instrument(info_span!("liveness", role = "manager")),
    );
    let tracker = tokio::spawn(
        TreeSizeTracker::run(config, token.child_token()).instrument(info_span!("sth_tracker", role = "manager")),
    );
    vec![liveness, tracker]
}
