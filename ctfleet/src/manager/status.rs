use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use super::frontier::ProgressFrontier;
use super::rate::request_interval_sec;
use crate::core::client::lock::LockKey;
use crate::core::config::ManagerConfig;
use crate::error::{FleetError, FleetResult};
use crate::types::api::{FailedResponse, MessageResponse, PingResponse, StatusReport, WorkerErrorReport};
use crate::types::batch::{BatchAssignment, BatchStatus, NewAssignment};

/// Worker-driven transitions of `worker_status` rows.
///
/// Every call holds the lock of its `(worker, log, start, end)` key, so a
/// ping and a completion from the same worker never interleave.
pub struct WorkerStatusService;

impl WorkerStatusService {
    /// Heartbeat. Refreshes this worker's newest live row and returns the
    /// advisory intervals. A worker that holds no live row is told to stop.
    #[instrument(skip_all, fields(worker = %report.worker_name, log_name = %report.log_name, start = report.start, end = report.end))]
    pub async fn ping(
        config: &ManagerConfig,
        report: StatusReport,
        ip_address: Option<String>,
    ) -> FleetResult<PingResponse> {
        report.validate().map_err(FleetError::InvalidRequest)?;
        let _guard = config.locks().lock(status_key(&report)).await;
        let database = config.database();
        let params = config.scheduler();

        let rows = database.assignments_for_range(&report.key()).await?;
        let alive = if rows.is_empty() {
            let adopted = Self::adopt(config, &report, ip_address).await?;
            info!(id = adopted.id, "Adopted unknown range from heartbeat");
            true
        } else {
            match newest_live(&rows, &report.worker_name) {
                // A heartbeat queued before a resume request must not revive the row.
                Some(row) => {
                    database
                        .update_progress(
                            row.id,
                            report.progress(ip_address),
                            BatchStatus::Running,
                            &[BatchStatus::Running],
                            Utc::now(),
                        )
                        .await?
                }
                None => false,
            }
        };

        let running = database.count_running_on_log(&report.log_name).await?;
        let kill_now_sleep_sec = if alive {
            0
        } else {
            warn!("Heartbeat for a range this worker no longer holds");
            params.kill_now_sleep_sec.max(1)
        };
        Ok(PingResponse {
            ping_interval_sec: params.ping_interval_sec,
            request_interval_sec: request_interval_sec(params, running, report.max_retry_after),
            overdue_threshold_sec: params.overdue_threshold_sec,
            overdue_sleep_sec: params.overdue_sleep_sec,
            kill_now_sleep_sec,
        })
    }

    /// Marks the worker's newest unfinished row completed and folds its
    /// counters into the lifetime stats. Repeated calls are acknowledged
    /// without folding again.
    #[instrument(skip_all, fields(worker = %report.worker_name, log_name = %report.log_name, start = report.start, end = report.end))]
    pub async fn completed(
        config: &ManagerConfig,
        report: StatusReport,
        ip_address: Option<String>,
    ) -> FleetResult<MessageResponse> {
        report.validate().map_err(FleetError::InvalidRequest)?;
        let _guard = config.locks().lock(status_key(&report)).await;
        let database = config.database();

        let rows = database.assignments_for_range(&report.key()).await?;
        let own: Vec<&BatchAssignment> = rows.iter().filter(|row| row.worker_name == report.worker_name).collect();
        let target = if own.is_empty() {
            Self::adopt(config, &report, ip_address.clone()).await?.id
        } else {
            match own.iter().find(|row| row.status != BatchStatus::Completed) {
                Some(row) => row.id,
                None => {
                    debug!("Range already completed by this worker");
                    return Ok(MessageResponse::new("already completed"));
                }
            }
        };

        if !database.complete_assignment(target, report.progress(ip_address), Utc::now()).await? {
            return Ok(MessageResponse::new("already completed"));
        }
        if let Some(log) = database.get_log(&report.log_name).await? {
            ProgressFrontier::invalidate(config, &log.category, &log.name)?;
        }
        if report.current <= report.end {
            info!(id = target, current = report.current, "Batch completed short of its end, range stays open");
        } else {
            info!(id = target, jp_count = report.jp_count, "Batch completed");
        }
        Ok(MessageResponse::new("completed"))
    }

    /// The worker stopped early; the range becomes claimable again.
    #[instrument(skip_all, fields(worker = %report.worker_name, log_name = %report.log_name, start = report.start, end = report.end))]
    pub async fn resume_request(
        config: &ManagerConfig,
        report: StatusReport,
        ip_address: Option<String>,
    ) -> FleetResult<MessageResponse> {
        report.validate().map_err(FleetError::InvalidRequest)?;
        let _guard = config.locks().lock(status_key(&report)).await;
        let database = config.database();

        let rows = database.assignments_for_range(&report.key()).await?;
        let Some(row) = newest_live(&rows, &report.worker_name) else {
            warn!("Resume request for a range this worker no longer holds");
            return Ok(MessageResponse::new("no live assignment"));
        };
        database
            .update_progress(
                row.id,
                report.progress(ip_address),
                BatchStatus::ResumeWait,
                &BatchStatus::LIVE,
                Utc::now(),
            )
            .await?;
        info!(id = row.id, current = report.current, "Batch moved to resume_wait");
        Ok(MessageResponse::new("resume_wait"))
    }

    /// The worker gave up on the range.
    #[instrument(skip_all, fields(worker = %report.worker_name, log_name = %report.log_name, start = report.start, end = report.end))]
    pub async fn failed(
        config: &ManagerConfig,
        report: StatusReport,
        ip_address: Option<String>,
    ) -> FleetResult<FailedResponse> {
        report.validate().map_err(FleetError::InvalidRequest)?;
        let _guard = config.locks().lock(status_key(&report)).await;
        let database = config.database();

        let rows = database.assignments_for_range(&report.key()).await?;
        match newest_live(&rows, &report.worker_name) {
            Some(row) => {
                database
                    .update_progress(
                        row.id,
                        report.progress(ip_address),
                        BatchStatus::Failed,
                        &BatchStatus::LIVE,
                        Utc::now(),
                    )
                    .await?;
                warn!(id = row.id, current = report.current, "Batch failed");
            }
            None => warn!("Failure reported for a range this worker no longer holds"),
        }
        Ok(FailedResponse { failed_sleep_sec: config.scheduler().failed_sleep_sec })
    }

    #[instrument(skip_all, fields(worker = %report.worker_name, log_name = %report.log_name))]
    pub async fn worker_error(config: &ManagerConfig, report: WorkerErrorReport) -> FleetResult<MessageResponse> {
        if report.worker_name.trim().is_empty() {
            return Err(FleetError::InvalidRequest("worker_name must not be empty".to_string()));
        }
        error!(
            start = report.start,
            end = report.end,
            error_type = %report.error_type,
            message = %report.message,
            "Worker reported an error"
        );
        config.database().insert_worker_error(report).await?;
        Ok(MessageResponse::new("recorded"))
    }

    /// Inserts a running row for a range the manager never handed out.
    async fn adopt(
        config: &ManagerConfig,
        report: &StatusReport,
        ip_address: Option<String>,
    ) -> FleetResult<BatchAssignment> {
        let database = config.database();
        let ct_log_url = match report.ct_log_url.as_deref().filter(|url| !url.is_empty()) {
            Some(url) => url.to_string(),
            None => database
                .get_log(&report.log_name)
                .await?
                .map(|log| log.url)
                .ok_or_else(|| FleetError::UnknownLog(report.log_name.clone()))?,
        };
        let row = database
            .insert_assignment(NewAssignment {
                worker_name: report.worker_name.clone(),
                log_name: report.log_name.clone(),
                ct_log_url,
                start: report.start,
                end: report.end,
                current: report.current,
                status: BatchStatus::Running,
                ip_address,
            })
            .await?;
        Ok(row)
    }
}

fn status_key(report: &StatusReport) -> LockKey {
    LockKey::status(&report.worker_name, &report.log_name, report.start, report.end)
}

/// `rows` are newest first.
fn newest_live<'a>(rows: &'a [BatchAssignment], worker_name: &str) -> Option<&'a BatchAssignment> {
    rows.iter().find(|row| row.worker_name == worker_name && row.status.is_live())
}
