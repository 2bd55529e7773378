use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::client::lock::LockKey;
use crate::core::config::ManagerConfig;
use crate::error::FleetResult;
use crate::types::batch::BatchStatus;

/// What one sweep changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub dead: u64,
    pub skipped: u64,
}

/// Declares silent workers dead and retires ranges that keep failing.
pub struct LivenessMonitor;

impl LivenessMonitor {
    /// Sweeps every `liveness_interval_sec` after an initial
    /// `liveness_startup_delay_sec`, until `token` is cancelled.
    pub async fn run(config: Arc<ManagerConfig>, token: CancellationToken) {
        let params = config.scheduler();
        let startup_delay = Duration::from_secs(params.liveness_startup_delay_sec);
        let interval = Duration::from_secs(params.liveness_interval_sec);
        info!(startup_delay_sec = startup_delay.as_secs(), interval_sec = interval.as_secs(), "Liveness monitor started");

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(startup_delay) => {}
        }
        loop {
            match Self::sweep(&config).await {
                Ok(summary) if summary != SweepSummary::default() => {
                    info!(dead = summary.dead, skipped = summary.skipped, "Liveness sweep changed assignments")
                }
                Ok(_) => debug!("Liveness sweep found nothing to do"),
                Err(e) => error!(error = %e, "Liveness sweep failed"),
            }
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("Liveness monitor stopped");
    }

    pub async fn sweep(config: &ManagerConfig) -> FleetResult<SweepSummary> {
        Self::sweep_at(config, Utc::now()).await
    }

    /// One pass over the live rows as seen at `now`.
    pub async fn sweep_at(config: &ManagerConfig, now: DateTime<Utc>) -> FleetResult<SweepSummary> {
        let database = config.database();
        let params = config.scheduler();
        let dead_after = chrono::Duration::seconds(params.dead_threshold_sec as i64);
        let mut summary = SweepSummary::default();

        for candidate in database.live_assignments().await? {
            let _guard = config
                .locks()
                .lock(LockKey::status(&candidate.worker_name, &candidate.log_name, candidate.start, candidate.end))
                .await;
            // The row may have moved on while we waited for the lock.
            let Some(row) = database.get_assignment(candidate.id).await? else { continue };
            if !row.status.is_live() {
                continue;
            }

            let failures = database.count_failures(&row.key()).await?;
            let stale = row.last_ping.map_or(true, |at| now - at > dead_after);
            let to = if stale {
                if failures + 1 > params.skip_threshold { BatchStatus::Skipped } else { BatchStatus::Dead }
            } else if failures > params.skip_threshold {
                BatchStatus::Skipped
            } else {
                continue;
            };

            if database.transition_status(row.id, &BatchStatus::LIVE, to).await? {
                match to {
                    BatchStatus::Skipped => {
                        warn!(worker = %row.worker_name, range = %row.key(), failures, "Range skipped");
                        summary.skipped += 1;
                    }
                    _ => {
                        info!(worker = %row.worker_name, range = %row.key(), last_ping = ?row.last_ping, "Worker declared dead");
                        summary.dead += 1;
                    }
                }
            }
        }

        // Ranges nobody holds any more but which failed too often.
        for key in database.chronic_ranges(params.skip_threshold).await? {
            if database.skip_latest_failure(&key).await? {
                warn!(range = %key, "Chronically failing range skipped");
                summary.skipped += 1;
            }
        }
        Ok(summary)
    }
}
