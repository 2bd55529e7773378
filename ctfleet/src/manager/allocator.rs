use std::collections::HashSet;

use chrono::Utc;
use rand::seq::SliceRandom;
use tracing::{debug, info, instrument, trace};

use super::frontier::{next_boundary, ProgressFrontier};
use super::rate::request_interval_sec;
use crate::core::client::lock::LockKey;
use crate::core::config::ManagerConfig;
use crate::error::{FleetError, FleetResult};
use crate::types::api::{BatchDescriptor, NextTaskResponse, ALL_LOGS_COMPLETED};
use crate::types::batch::{BatchStatus, NewAssignment};

/// Hands out the next unclaimed batch of a category.
pub struct TaskAllocator;

impl TaskAllocator {
    /// Picks a log of `category` and claims its first batch that is not
    /// running, completed or skipped. The claim is written before it is returned.
    #[instrument(skip(config, ip_address), fields(worker = %worker_name, category = %category))]
    pub async fn next_task(
        config: &ManagerConfig,
        worker_name: &str,
        category: &str,
        ip_address: Option<String>,
    ) -> FleetResult<NextTaskResponse> {
        if worker_name.trim().is_empty() {
            return Err(FleetError::InvalidRequest("worker_name must not be empty".to_string()));
        }
        let _guard = config.locks().lock(LockKey::allocation(worker_name, category)).await;
        let database = config.database();
        let params = config.scheduler();

        let mut logs = database.logs_in_category(category).await?;
        if logs.is_empty() && !database.list_categories().await?.iter().any(|c| c.name == category) {
            return Err(FleetError::UnknownCategory(category.to_string()));
        }
        logs.retain(|log| !log.fetch_completed);
        logs.shuffle(&mut rand::thread_rng());

        let failure_window = chrono::Duration::seconds(params.recent_failure_window_sec as i64);
        let since = Utc::now() - failure_window;

        for log in logs {
            if params.recent_failure_limit > 0 {
                let failures = database.recent_failures(worker_name, &log.name, since).await?;
                if failures >= params.recent_failure_limit {
                    debug!(log_name = %log.name, failures, "Skipping log this worker keeps failing on");
                    continue;
                }
            }

            let tree_size = match database.get_tree_size(&log.name).await? {
                Some(size) if size.tree_size > 0 => size.tree_size,
                _ => {
                    trace!(log_name = %log.name, "Tree size not known yet");
                    continue;
                }
            };

            let frontier = ProgressFrontier::min_completed_end(config, category, &log.name).await?;
            let mut claimed = database.claimed_ends(&log.name, frontier).await?;

            while let Some((start, end)) = next_unclaimed_range(frontier, params.batch_size, tree_size, &claimed) {
                let new = NewAssignment {
                    worker_name: worker_name.to_string(),
                    log_name: log.name.clone(),
                    ct_log_url: log.url.clone(),
                    start,
                    end,
                    current: start,
                    status: BatchStatus::Running,
                    ip_address: ip_address.clone(),
                };
                match database.claim_range(new).await? {
                    Some(assignment) => {
                        let running = database.count_running_on_log(&log.name).await?;
                        info!(
                            log_name = %log.name,
                            start,
                            end,
                            tree_size,
                            id = assignment.id,
                            "Batch assigned"
                        );
                        return Ok(NextTaskResponse::Assigned(BatchDescriptor {
                            log_name: log.name,
                            ct_log_url: log.url,
                            start,
                            end,
                            sth_end: tree_size - 1,
                            request_interval_sec: request_interval_sec(params, running, 0),
                        }));
                    }
                    // Another manager task claimed it between our read and write.
                    None => {
                        claimed.insert(end);
                    }
                }
            }
        }

        debug!("No assignable batch in category");
        Ok(NextTaskResponse::AllCompleted {
            message: ALL_LOGS_COMPLETED.to_string(),
            sleep_sec: params.all_completed_sleep_sec,
        })
    }
}

/// First batch at or after the frontier whose end is not in `claimed`.
///
/// Batches are keyed by their end. Full batches end on `k * batch_size - 1`;
/// the tail batch of a log is keyed by `tree_size - 1` instead.
pub(crate) fn next_unclaimed_range(
    frontier: Option<u64>,
    batch_size: u64,
    tree_size: u64,
    claimed: &HashSet<u64>,
) -> Option<(u64, u64)> {
    if tree_size == 0 || batch_size == 0 {
        return None;
    }
    let mut boundary = next_boundary(frontier, batch_size);
    while boundary + 1 - batch_size < tree_size {
        let end = boundary.min(tree_size - 1);
        if !claimed.contains(&end) {
            return Some((boundary + 1 - batch_size, end));
        }
        boundary += batch_size;
    }
    None
}
