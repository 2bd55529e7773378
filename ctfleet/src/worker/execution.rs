use std::sync::Arc;
use std::time::{Duration, Instant};

use ctfleet_ct_log_client::{CtLogError, CtLogSource, FetchOutcome};
use ctfleet_entry_parser::EntryParser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::client::{Delivery, ManagerClient};
use crate::types::api::{BatchDescriptor, PingResponse, StatusReport, UploadItem, WorkerErrorReport};
use crate::types::batch::BatchStatus;
use crate::types::params::{Advisory, WorkerParams};

/// How a batch run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every index was fetched, or the log asked us to come back with a newer tree size.
    Completed,
    /// Too many empty pages in a row; reported `failed`.
    Failed,
    /// The manager told us the range is no longer ours.
    Killed,
    /// Ran past the overdue threshold; reported `resume_wait`.
    Overdue,
    /// Local shutdown; reported `resume_wait`.
    Stopped,
    /// Unexpected error; reported as an error event, then `resume_wait`.
    Errored,
}

/// Loop limits copied out of [`WorkerParams`].
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub worker_name: String,
    pub upload_batch_size: usize,
    pub max_empty_streak: u32,
    pub max_backoff: Duration,
}

impl From<&WorkerParams> for LoopSettings {
    fn from(params: &WorkerParams) -> Self {
        Self {
            worker_name: params.worker_name.clone(),
            upload_batch_size: params.upload_batch_size,
            max_empty_streak: params.max_empty_streak,
            max_backoff: params.max_backoff,
        }
    }
}

#[derive(Debug)]
struct BatchState {
    current: u64,
    scanned: u64,
    jp_count: u64,
    total_retries: u64,
    max_retry_after: u64,
    last_uploaded_index: Option<u64>,
    empty_streak: u32,
    retry_streak: u32,
    buffer: Vec<UploadItem>,
    last_ping: Option<Instant>,
    started: Instant,
}

impl BatchState {
    fn new(start: u64) -> Self {
        Self {
            current: start,
            scanned: 0,
            jp_count: 0,
            total_retries: 0,
            max_retry_after: 0,
            last_uploaded_index: None,
            empty_streak: 0,
            retry_streak: 0,
            buffer: Vec::new(),
            last_ping: None,
            started: Instant::now(),
        }
    }

    fn jp_ratio(&self) -> f64 {
        if self.scanned == 0 {
            0.0
        } else {
            self.jp_count as f64 / self.scanned as f64
        }
    }
}

/// Runs one claimed batch against its CT log.
pub struct BatchExecutor {
    settings: LoopSettings,
    client: Arc<ManagerClient>,
    parser: Arc<dyn EntryParser>,
    source: Arc<dyn CtLogSource>,
    advisory: Advisory,
    token: CancellationToken,
}

impl BatchExecutor {
    pub fn new(
        settings: LoopSettings,
        client: Arc<ManagerClient>,
        parser: Arc<dyn EntryParser>,
        source: Arc<dyn CtLogSource>,
        advisory: Advisory,
        token: CancellationToken,
    ) -> Self {
        Self { settings, client, parser, source, advisory, token }
    }

    /// Advisory values as last adjusted by the manager.
    pub fn advisory(&self) -> &Advisory {
        &self.advisory
    }

    #[instrument(skip_all, fields(log_name = %batch.log_name, start = batch.start, end = batch.end))]
    pub async fn run(&mut self, batch: &BatchDescriptor) -> BatchOutcome {
        self.advisory.request_interval = Duration::from_secs_f64(batch.request_interval_sec.max(0.0));
        let mut state = BatchState::new(batch.start);
        info!("Batch started");

        loop {
            if self.token.is_cancelled() {
                return self.stop(batch, &mut state, BatchOutcome::Stopped).await;
            }
            if !self.advisory.overdue_threshold.is_zero() && state.started.elapsed() > self.advisory.overdue_threshold {
                warn!(current = state.current, "Batch overdue, probably rate limited");
                let outcome = self.stop(batch, &mut state, BatchOutcome::Overdue).await;
                self.pause(self.advisory.overdue_sleep).await;
                return outcome;
            }
            if state.current > batch.end {
                break;
            }

            match self.source.get_entries(state.current, batch.end).await {
                Ok(FetchOutcome::NeedTreeSize) => {
                    info!(current = state.current, "Log needs a newer tree size, batch done for now");
                    return self.finish(batch, &mut state).await;
                }
                Ok(FetchOutcome::Entries(entries)) if entries.is_empty() => {
                    state.empty_streak += 1;
                    if state.empty_streak > self.settings.max_empty_streak {
                        return self.give_up(batch, &mut state).await;
                    }
                    if let Some(sleep) = self.heartbeat(batch, &mut state, true).await {
                        return self.killed(batch, &mut state, sleep).await;
                    }
                    let wait = backoff(state.empty_streak, self.settings.max_backoff);
                    debug!(streak = state.empty_streak, wait_sec = wait.as_secs(), "Empty page, backing off");
                    self.pause(wait).await;
                    continue;
                }
                Ok(FetchOutcome::Entries(entries)) => {
                    state.empty_streak = 0;
                    state.retry_streak = 0;
                    let remaining = batch.end - state.current + 1;
                    let consumed = (entries.len() as u64).min(remaining);
                    for (offset, entry) in entries.iter().take(consumed as usize).enumerate() {
                        let index = state.current + offset as u64;
                        match self.parser.parse(entry) {
                            Ok(Some(entry)) => {
                                state.jp_count += 1;
                                state.buffer.push(UploadItem {
                                    entry,
                                    log_name: batch.log_name.clone(),
                                    ct_log_url: batch.ct_log_url.clone(),
                                    worker_name: self.settings.worker_name.clone(),
                                    index,
                                });
                            }
                            Ok(None) => {}
                            Err(e) => debug!(index, error = %e, "Entry could not be parsed"),
                        }
                    }
                    state.scanned += consumed;
                    state.current += consumed;
                    trace!(current = state.current, consumed, "Page processed");
                    if state.buffer.len() >= self.settings.upload_batch_size {
                        self.flush(&mut state).await;
                    }
                }
                Err(e) if e.is_retryable() => {
                    state.total_retries += 1;
                    state.retry_streak += 1;
                    if let Some(retry_after) = e.retry_after() {
                        state.max_retry_after = state.max_retry_after.max(retry_after.as_secs());
                    }
                    let wait = e.retry_after().unwrap_or_else(|| backoff(state.retry_streak, self.settings.max_backoff));
                    warn!(error = %e, wait_sec = wait.as_secs(), "Transient log error");
                    if let Some(sleep) = self.heartbeat(batch, &mut state, false).await {
                        return self.killed(batch, &mut state, sleep).await;
                    }
                    self.pause(wait).await;
                    continue;
                }
                Err(e) => return self.errored(batch, &mut state, &e).await,
            }

            if let Some(sleep) = self.heartbeat(batch, &mut state, false).await {
                return self.killed(batch, &mut state, sleep).await;
            }
            self.pause(self.advisory.request_interval).await;
        }

        self.finish(batch, &mut state).await
    }

    async fn finish(&mut self, batch: &BatchDescriptor, state: &mut BatchState) -> BatchOutcome {
        self.flush(state).await;
        let report = self.report(batch, state, BatchStatus::Completed);
        if let Err(e) = self.client.completed(&report).await {
            warn!(error = %e, "Completion report rejected");
        }
        info!(jp_count = state.jp_count, scanned = state.scanned, "Batch completed");
        BatchOutcome::Completed
    }

    /// Reports `resume_wait` so the range can be reclaimed without waiting
    /// for the dead threshold.
    async fn stop(&mut self, batch: &BatchDescriptor, state: &mut BatchState, outcome: BatchOutcome) -> BatchOutcome {
        self.flush(state).await;
        let report = self.report(batch, state, BatchStatus::ResumeWait);
        if let Err(e) = self.client.resume(&report).await {
            warn!(error = %e, "Resume request rejected");
        }
        info!(current = state.current, ?outcome, "Batch stopped early");
        outcome
    }

    async fn give_up(&mut self, batch: &BatchDescriptor, state: &mut BatchState) -> BatchOutcome {
        warn!(streak = state.empty_streak, current = state.current, "Too many empty pages, failing batch");
        self.flush(state).await;
        let report = self.report(batch, state, BatchStatus::Failed);
        match self.client.failed(&report).await {
            Ok(Delivery::Delivered(response)) => self.pause(Duration::from_secs(response.failed_sleep_sec)).await,
            Ok(Delivery::Queued) => {}
            Err(e) => warn!(error = %e, "Failure report rejected"),
        }
        BatchOutcome::Failed
    }

    async fn killed(&mut self, batch: &BatchDescriptor, state: &mut BatchState, sleep: Duration) -> BatchOutcome {
        warn!(log_name = %batch.log_name, sleep_sec = sleep.as_secs(), "Manager revoked the batch");
        self.flush(state).await;
        self.pause(sleep).await;
        BatchOutcome::Killed
    }

    async fn errored(&mut self, batch: &BatchDescriptor, state: &mut BatchState, error: &CtLogError) -> BatchOutcome {
        warn!(error = %error, "Batch aborted by an unexpected error");
        let event = WorkerErrorReport {
            worker_name: self.settings.worker_name.clone(),
            log_name: batch.log_name.clone(),
            start: batch.start,
            end: batch.end,
            error_type: error.error_type().to_string(),
            message: error.to_string(),
        };
        if let Err(e) = self.client.worker_error(&event).await {
            warn!(error = %e, "Error event rejected");
        }
        self.stop(batch, state, BatchOutcome::Errored).await
    }

    /// Sends a heartbeat if one is due. Returns the sleep the manager asked
    /// for when it revoked the batch.
    async fn heartbeat(&mut self, batch: &BatchDescriptor, state: &mut BatchState, force: bool) -> Option<Duration> {
        let due = state.last_ping.map_or(true, |at| at.elapsed() >= self.advisory.ping_interval);
        if !force && !due {
            return None;
        }
        state.last_ping = Some(Instant::now());
        let report = self.report(batch, state, BatchStatus::Running);
        match self.client.ping(&report).await {
            Ok(Delivery::Delivered(response)) => self.apply(&response),
            Ok(Delivery::Queued) => None,
            Err(e) => {
                warn!(error = %e, "Heartbeat rejected");
                None
            }
        }
    }

    fn apply(&mut self, response: &PingResponse) -> Option<Duration> {
        self.advisory.ping_interval = Duration::from_secs(response.ping_interval_sec);
        self.advisory.request_interval = Duration::from_secs_f64(response.request_interval_sec.max(0.0));
        self.advisory.overdue_threshold = Duration::from_secs(response.overdue_threshold_sec);
        self.advisory.overdue_sleep = Duration::from_secs(response.overdue_sleep_sec);
        (response.kill_now_sleep_sec > 0).then(|| Duration::from_secs(response.kill_now_sleep_sec))
    }

    async fn flush(&self, state: &mut BatchState) {
        if state.buffer.is_empty() {
            return;
        }
        let items = std::mem::take(&mut state.buffer);
        let highest = items.iter().map(|item| item.index).max();
        match self.client.upload(&items).await {
            Ok(Delivery::Delivered(response)) => {
                debug!(inserted = response.inserted, duplicates = response.skipped_duplicates, "Upload delivered");
                state.last_uploaded_index = highest.max(state.last_uploaded_index);
            }
            // The retry loop owns the items now.
            Ok(Delivery::Queued) => state.last_uploaded_index = highest.max(state.last_uploaded_index),
            Err(e) => warn!(error = %e, items = items.len(), "Upload rejected, items dropped"),
        }
    }

    fn report(&self, batch: &BatchDescriptor, state: &BatchState, status: BatchStatus) -> StatusReport {
        StatusReport {
            worker_name: self.settings.worker_name.clone(),
            log_name: batch.log_name.clone(),
            start: batch.start,
            end: batch.end,
            current: state.current,
            status: Some(status),
            jp_count: state.jp_count,
            jp_ratio: state.jp_ratio(),
            last_uploaded_index: state.last_uploaded_index,
            total_retries: state.total_retries,
            max_retry_after: state.max_retry_after,
            ct_log_url: Some(batch.ct_log_url.clone()),
        }
    }

    /// Sleeps unless the token is cancelled first.
    async fn pause(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}

/// 1, 2, 4, ... seconds, capped at `max`.
pub(crate) fn backoff(streak: u32, max: Duration) -> Duration {
    let exponent = streak.saturating_sub(1).min(16);
    Duration::from_secs(1u64 << exponent).min(max)
}
