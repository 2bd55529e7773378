use crate::types::params::SchedulerParams;

/// Per-request delay a worker should keep against one log.
///
/// The fleet-wide budget `max_requests_per_sec_per_log` is split across the
/// assignments currently running on the log. A worker that reports a
/// `Retry-After` gets at least that wait spread over the same assignments.
pub fn request_interval_sec(params: &SchedulerParams, running_on_log: u64, max_retry_after: u64) -> f64 {
    let running = running_on_log.max(1) as f64;
    let mut interval = params.min_request_interval_sec;
    if params.max_requests_per_sec_per_log > 0.0 {
        interval = interval.max(running / params.max_requests_per_sec_per_log);
    }
    if max_retry_after > 0 {
        interval = interval.max(max_retry_after as f64 / running);
    }
    interval
}
