use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ctfleet_ct_log_client::{CtLogClient, CtLogSource};
use ctfleet_entry_parser::EntryParser;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::ManagerClient;
use super::execution::{BatchExecutor, BatchOutcome, LoopSettings};
use crate::types::api::{BatchDescriptor, NextTaskResponse};
use crate::types::params::{Advisory, WorkerParams};

/// Pulls batches of one category from the manager and runs them back to back.
pub struct CategoryRunner {
    category: String,
    params: Arc<WorkerParams>,
    client: Arc<ManagerClient>,
    parser: Arc<dyn EntryParser>,
    token: CancellationToken,
}

impl CategoryRunner {
    pub fn new(
        category: String,
        params: Arc<WorkerParams>,
        client: Arc<ManagerClient>,
        parser: Arc<dyn EntryParser>,
        token: CancellationToken,
    ) -> Self {
        Self { category, params, client, parser, token }
    }

    pub async fn run(self) {
        let mut advisory = self.params.advisory.clone();
        let mut last: Option<BatchDescriptor> = None;
        let mut regenerated: HashSet<(String, u64)> = HashSet::new();
        info!(category = %self.category, "Category runner started");

        while !self.token.is_cancelled() {
            let batch = match self.client.next_task(&self.params.worker_name, &self.category).await {
                Ok(NextTaskResponse::Assigned(batch)) => {
                    regenerated.clear();
                    batch
                }
                Ok(NextTaskResponse::AllCompleted { message, sleep_sec }) => {
                    debug!(category = %self.category, %message, sleep_sec, "Nothing to do");
                    self.pause(Duration::from_secs(sleep_sec)).await;
                    continue;
                }
                Err(e) => {
                    warn!(category = %self.category, error = %e, failures = self.client.consecutive_failures(), "next_task failed");
                    match self.regenerate(last.as_ref(), &regenerated).await {
                        Some(batch) => {
                            info!(log_name = %batch.log_name, start = batch.start, end = batch.end, "Manager unavailable, continuing on a regenerated range");
                            regenerated.insert((batch.log_name.clone(), batch.end));
                            batch
                        }
                        None => {
                            self.pause(self.params.manager_retry_sleep).await;
                            continue;
                        }
                    }
                }
            };

            let source: Arc<dyn CtLogSource> = match CtLogClient::new(&batch.ct_log_url, self.params.max_page_size) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    warn!(log_name = %batch.log_name, error = %e, "Cannot build log client");
                    self.pause(self.params.manager_retry_sleep).await;
                    continue;
                }
            };
            let mut executor = BatchExecutor::new(
                LoopSettings::from(self.params.as_ref()),
                self.client.clone(),
                self.parser.clone(),
                source,
                advisory.clone(),
                self.token.clone(),
            );
            let outcome = executor.run(&batch).await;
            advisory = executor.advisory().clone();
            debug!(category = %self.category, ?outcome, "Batch finished");
            if outcome == BatchOutcome::Stopped {
                break;
            }
            last = Some(batch);
        }
        info!(category = %self.category, "Category runner stopped");
    }

    /// A range to work on while the manager stays down, if the outage looks
    /// like the manager's and not our own network's.
    async fn regenerate(
        &self,
        last: Option<&BatchDescriptor>,
        tried: &HashSet<(String, u64)>,
    ) -> Option<BatchDescriptor> {
        if self.client.consecutive_failures() < self.params.manager_failure_threshold {
            return None;
        }
        let last = last?;
        if !self.manager_resolves().await {
            warn!("Manager host does not resolve, not regenerating ranges");
            return None;
        }
        let tried: HashSet<u64> =
            tried.iter().filter(|(log_name, _)| *log_name == last.log_name).map(|(_, end)| *end).collect();
        fabricate_range(last, self.params.batch_size, &mut rand::thread_rng(), &tried)
    }

    async fn manager_resolves(&self) -> bool {
        let url = self.client.base_url();
        let Some(host) = url.host_str() else { return false };
        let port = url.port_or_known_default().unwrap_or(80);
        match tokio::net::lookup_host((host, port)).await {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(_) => false,
        }
    }

    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}

/// Picks a random batch-aligned range after `last` and inside its known tree
/// size, avoiding range ends in `tried`.
pub(crate) fn fabricate_range<R: Rng + ?Sized>(
    last: &BatchDescriptor,
    batch_size: u64,
    rng: &mut R,
    tried: &HashSet<u64>,
) -> Option<BatchDescriptor> {
    let low = last.end.checked_add(1)?;
    let high = last.sth_end;
    if batch_size == 0 || low > high {
        return None;
    }
    // Batches whose start is aligned and not below `low`.
    let first = low.div_ceil(batch_size);
    let last_batch = high / batch_size;
    if first > last_batch {
        return None;
    }

    let count = last_batch - first + 1;
    let pick = rng.gen_range(0..count);
    for step in 0..count.min(tried.len() as u64 + 1) {
        let k = first + (pick + step) % count;
        let start = k * batch_size;
        let end = (start + batch_size - 1).min(high);
        if !tried.contains(&end) {
            return Some(BatchDescriptor { start, end, ..last.clone() });
        }
    }
    None
}
