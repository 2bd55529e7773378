use ctfleet_entry_parser::{LogEntryType, ParsedCertificate};

use crate::core::config::ManagerConfig;
use crate::manager::allocator::TaskAllocator;
use crate::types::api::{BatchDescriptor, NextTaskResponse, PingResponse, StatusReport, UploadItem};
use crate::types::batch::{BatchAssignment, BatchKey, BatchStatus};

/// A status report for `[start, end]` with no progress yet.
pub fn report(worker_name: &str, log_name: &str, start: u64, end: u64) -> StatusReport {
    StatusReport {
        worker_name: worker_name.to_string(),
        log_name: log_name.to_string(),
        start,
        end,
        current: start,
        status: None,
        jp_count: 0,
        jp_ratio: 0.0,
        last_uploaded_index: None,
        total_retries: 0,
        max_retry_after: 0,
        ct_log_url: None,
    }
}

pub fn report_for(worker_name: &str, batch: &BatchDescriptor) -> StatusReport {
    report(worker_name, &batch.log_name, batch.start, batch.end)
}

/// A completion report for a batch whose every index was fetched.
pub fn finished(worker_name: &str, batch: &BatchDescriptor) -> StatusReport {
    let mut report = report_for(worker_name, batch);
    report.current = batch.end + 1;
    report.status = Some(BatchStatus::Completed);
    report
}

pub fn certificate(serial: u64) -> ParsedCertificate {
    ParsedCertificate {
        issuer: "CN=Test CA".to_string(),
        serial_number: format!("{serial:x}"),
        fingerprint: format!("{serial:064x}"),
        subject: format!("CN=host{serial}.example.jp"),
        dns_names: vec![format!("host{serial}.example.jp")],
        entry_type: LogEntryType::X509,
        timestamp: 1_700_000_000_000,
    }
}

pub fn upload_item(serial: u64, log_name: &str) -> UploadItem {
    UploadItem {
        entry: certificate(serial),
        log_name: log_name.to_string(),
        ct_log_url: format!("https://ct.example/{log_name}"),
        worker_name: "w1".to_string(),
        index: serial,
    }
}

/// Advisory values that let a worker loop run without sleeping.
pub fn ping_response(kill_now_sleep_sec: u64) -> PingResponse {
    PingResponse {
        ping_interval_sec: 0,
        request_interval_sec: 0.0,
        overdue_threshold_sec: 3600,
        overdue_sleep_sec: 0,
        kill_now_sleep_sec,
    }
}

/// Asks for a task and fails the test unless one is assigned.
pub async fn assign(config: &ManagerConfig, worker_name: &str, category: &str) -> BatchDescriptor {
    match TaskAllocator::next_task(config, worker_name, category, None).await.unwrap() {
        NextTaskResponse::Assigned(batch) => batch,
        other => panic!("expected an assignment, got {other:?}"),
    }
}

pub async fn rows(config: &ManagerConfig, log_name: &str, start: u64, end: u64) -> Vec<BatchAssignment> {
    config.database().assignments_for_range(&BatchKey::new(log_name, start, end)).await.unwrap()
}
