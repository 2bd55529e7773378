use std::sync::Arc;
use std::time::Duration;

use ctfleet_ct_log_client::{CtLogClient, CtLogSource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::frontier::ProgressFrontier;
use crate::core::config::ManagerConfig;
use crate::error::FleetResult;
use crate::types::log::CtLog;

/// Keeps the stored tree size of every registered log current.
pub struct TreeSizeTracker;

impl TreeSizeTracker {
    pub async fn run(config: Arc<ManagerConfig>, token: CancellationToken) {
        let interval = Duration::from_secs(config.scheduler().sth_poll_interval_sec);
        info!(interval_sec = interval.as_secs(), "Tree size tracker started");
        loop {
            if let Err(e) = Self::sweep(&config).await {
                warn!(error = %e, "Tree size sweep failed");
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("Tree size tracker stopped");
    }

    /// Polls every log once. A failing log is logged and skipped.
    pub async fn sweep(config: &ManagerConfig) -> FleetResult<()> {
        for log in config.database().list_logs().await? {
            if log.fetch_completed {
                continue;
            }
            let client = match CtLogClient::new(&log.url, 1) {
                Ok(client) => client,
                Err(e) => {
                    warn!(log_name = %log.name, error = %e, "Cannot build client for log");
                    continue;
                }
            };
            if let Err(e) = Self::refresh_log(config, &log, &client).await {
                warn!(log_name = %log.name, error = %e, "Tree size refresh failed");
            }
        }
        Ok(())
    }

    /// Fetches the STH of `log` and stores its size if it grew. A frozen log
    /// whose every entry is covered by completed batches is retired.
    pub async fn refresh_log(config: &ManagerConfig, log: &CtLog, source: &dyn CtLogSource) -> FleetResult<u64> {
        let database = config.database();
        let sth = source.get_sth().await?;
        if database.record_tree_size(&log.name, sth.tree_size).await? {
            info!(log_name = %log.name, tree_size = sth.tree_size, "Tree size updated");
        } else {
            debug!(log_name = %log.name, tree_size = sth.tree_size, "Tree size did not grow");
        }

        let tree_size = database.get_tree_size(&log.name).await?.map_or(sth.tree_size, |size| size.tree_size);
        if log.frozen
            && !log.fetch_completed
            && ProgressFrontier::is_exhausted(config, &log.category, &log.name, tree_size).await?
        {
            database.mark_log_fetch_completed(&log.name).await?;
            info!(log_name = %log.name, tree_size, "Frozen log fully fetched");
        }
        Ok(tree_size)
    }
}
