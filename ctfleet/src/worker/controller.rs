//! Scaling controller for category runners
//!
//! Periodically asks the manager for category weights and reconciles the
//! number of running runners per category against them.

use std::collections::HashMap;
use std::sync::Arc;

use ctfleet_entry_parser::EntryParser;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::category::CategoryRunner;
use super::client::ManagerClient;
use crate::types::params::WorkerParams;

struct RunnerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct CategoryThreadManager {
    params: Arc<WorkerParams>,
    client: Arc<ManagerClient>,
    parser: Arc<dyn EntryParser>,
    shutdown_token: CancellationToken,
    runners: HashMap<String, Vec<RunnerHandle>>,
    /// Cancelled runners still reporting their last batch.
    retiring: Vec<JoinHandle<()>>,
}

impl CategoryThreadManager {
    pub fn new(
        params: Arc<WorkerParams>,
        client: Arc<ManagerClient>,
        parser: Arc<dyn EntryParser>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self { params, client, parser, shutdown_token, runners: HashMap::new(), retiring: Vec::new() }
    }

    /// Reconciles every `scale_interval` until shutdown, then stops every runner.
    pub async fn run(mut self) {
        info!(max_threads = self.params.max_threads, "Category thread manager started");
        loop {
            self.reconcile().await;
            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(self.params.scale_interval) => {}
            }
        }
        self.shutdown().await;
    }

    /// One scaling pass. A manager failure leaves the current runners alone.
    pub async fn reconcile(&mut self) {
        let categories = match self.client.categories(&self.params.worker_name).await {
            Ok(categories) => categories,
            Err(e) => {
                warn!(error = %e, "Cannot fetch categories, keeping current runners");
                return;
            }
        };
        let desired = desired_counts(&categories.ordered_categories, self.params.max_threads);

        for runners in self.runners.values_mut() {
            runners.retain(|runner| !runner.handle.is_finished());
        }
        self.retiring.retain(|handle| !handle.is_finished());

        let mut names: Vec<String> = self.runners.keys().chain(desired.keys()).cloned().collect();
        names.sort();
        names.dedup();
        for category in names {
            let want = desired.get(&category).copied().unwrap_or(0);
            let runners = self.runners.entry(category.clone()).or_default();
            while runners.len() > want {
                if let Some(runner) = runners.pop() {
                    runner.token.cancel();
                    self.retiring.push(runner.handle);
                }
            }
            while runners.len() < want {
                let token = self.shutdown_token.child_token();
                let runner = CategoryRunner::new(
                    category.clone(),
                    self.params.clone(),
                    self.client.clone(),
                    self.parser.clone(),
                    token.clone(),
                );
                let span = info_span!("category", role = "worker", category = %category);
                let handle = tokio::spawn(runner.run().instrument(span));
                runners.push(RunnerHandle { token, handle });
            }
        }
        self.runners.retain(|_, runners| !runners.is_empty());
        debug!(running = ?self.running_counts(), "Runners reconciled");
    }

    pub fn running_counts(&self) -> HashMap<String, usize> {
        self.runners.iter().map(|(category, runners)| (category.clone(), runners.len())).collect()
    }

    /// Cancels every runner and waits for each to report its batch.
    pub async fn shutdown(&mut self) {
        info!("Stopping category runners");
        self.shutdown_token.cancel();
        let handles = self
            .runners
            .drain()
            .flat_map(|(_, runners)| runners.into_iter().map(|runner| runner.handle))
            .chain(self.retiring.drain(..))
            .collect::<Vec<_>>();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Category runner panicked");
            }
        }
        info!("Category runners stopped");
    }
}

/// Fills `max_threads` slots by cycling through `ordered`.
pub(crate) fn desired_counts(ordered: &[String], max_threads: usize) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    if ordered.is_empty() {
        return counts;
    }
    for category in ordered.iter().cycle().take(max_threads) {
        *counts.entry(category.clone()).or_insert(0) += 1;
    }
    counts
}
