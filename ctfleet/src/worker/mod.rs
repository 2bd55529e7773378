//! Worker role: pulls batches from the manager and scans them.

pub mod category;
pub mod client;
pub mod controller;
pub mod execution;
pub mod pending;

use std::sync::Arc;

use ctfleet_entry_parser::{DerEntryParser, EntryParser};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use crate::error::FleetResult;
use crate::types::params::WorkerParams;
use client::ManagerClient;
use controller::CategoryThreadManager;
use pending::PendingQueue;

/// Runs the retry loop and the category runners until `token` is cancelled.
/// In-flight batches are reported `resume_wait` before this returns.
pub async fn run_worker(params: WorkerParams, token: CancellationToken) -> FleetResult<()> {
    let params = Arc::new(params);
    let pending = Arc::new(PendingQueue::new(&params.pending_dir)?);
    let client = Arc::new(ManagerClient::new(params.manager_url.clone(), pending.clone())?);
    let parser: Arc<dyn EntryParser> = Arc::new(DerEntryParser::new(params.domain_suffixes.clone()));
    info!(worker = %params.worker_name, manager = %params.manager_url, "Worker starting");

    let retry = tokio::spawn(
        pending
            .run_retry_loop(client.clone(), params.retry_interval, token.child_token())
            .instrument(info_span!("pending_retry", role = "worker")),
    );

    let controller = CategoryThreadManager::new(params.clone(), client, parser, token.child_token());
    controller.run().instrument(info_span!("scaler", role = "worker")).await;

    token.cancel();
    retry.await?;
    info!(worker = %params.worker_name, "Worker stopped");
    Ok(())
}
