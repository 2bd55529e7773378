use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::cli::{ManagerCmd, SchedulerCliArgs, ServerCliArgs, SqliteCliArgs, WorkerCmd};

#[derive(Debug, Clone)]
pub struct ServerParams {
    pub host: String,
    pub port: u16,
}

impl From<ServerCliArgs> for ServerParams {
    fn from(value: ServerCliArgs) -> Self {
        Self { host: value.host, port: value.port }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseParams {
    pub path: String,
}

impl From<SqliteCliArgs> for DatabaseParams {
    fn from(value: SqliteCliArgs) -> Self {
        Self { path: value.database_path }
    }
}

/// Scheduler tuning shared by every manager service.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerParams {
    pub batch_size: u64,
    pub dead_threshold_sec: u64,
    pub skip_threshold: u64,
    pub liveness_interval_sec: u64,
    pub liveness_startup_delay_sec: u64,
    pub frontier_ttl_sec: u64,
    pub sth_poll_interval_sec: u64,
    pub all_completed_sleep_sec: u64,
    pub ping_interval_sec: u64,
    pub min_request_interval_sec: f64,
    pub max_requests_per_sec_per_log: f64,
    pub overdue_threshold_sec: u64,
    pub overdue_sleep_sec: u64,
    pub kill_now_sleep_sec: u64,
    pub failed_sleep_sec: u64,
    pub dedup_cache_capacity: usize,
    pub recent_failure_window_sec: u64,
    pub recent_failure_limit: u64,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            batch_size: 16_000,
            dead_threshold_sec: 300,
            skip_threshold: 3,
            liveness_interval_sec: 60,
            liveness_startup_delay_sec: 600,
            frontier_ttl_sec: 30,
            sth_poll_interval_sec: 300,
            all_completed_sleep_sec: 60,
            ping_interval_sec: 30,
            min_request_interval_sec: 0.5,
            max_requests_per_sec_per_log: 4.0,
            overdue_threshold_sec: 3600,
            overdue_sleep_sec: 900,
            kill_now_sleep_sec: 60,
            failed_sleep_sec: 120,
            dedup_cache_capacity: 500_000,
            recent_failure_window_sec: 1800,
            recent_failure_limit: 3,
        }
    }
}

impl From<SchedulerCliArgs> for SchedulerParams {
    fn from(args: SchedulerCliArgs) -> Self {
        Self {
            batch_size: args.batch_size.max(1),
            dead_threshold_sec: args.dead_threshold_sec,
            skip_threshold: args.skip_threshold,
            liveness_interval_sec: args.liveness_interval_sec.max(1),
            liveness_startup_delay_sec: args.liveness_startup_delay_sec,
            frontier_ttl_sec: args.frontier_ttl_sec,
            sth_poll_interval_sec: args.sth_poll_interval_sec.max(1),
            all_completed_sleep_sec: args.all_completed_sleep_sec,
            ping_interval_sec: args.ping_interval_sec,
            min_request_interval_sec: args.min_request_interval_sec.max(0.0),
            max_requests_per_sec_per_log: args.max_requests_per_sec_per_log,
            overdue_threshold_sec: args.overdue_threshold_sec,
            overdue_sleep_sec: args.overdue_sleep_sec,
            kill_now_sleep_sec: args.kill_now_sleep_sec,
            failed_sleep_sec: args.failed_sleep_sec,
            dedup_cache_capacity: args.dedup_cache_capacity,
            recent_failure_window_sec: args.recent_failure_window_sec,
            recent_failure_limit: args.recent_failure_limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagerParams {
    pub server: ServerParams,
    pub database: DatabaseParams,
    pub scheduler: SchedulerParams,
    pub logs_file: Option<PathBuf>,
}

impl From<ManagerCmd> for ManagerParams {
    fn from(cmd: ManagerCmd) -> Self {
        Self {
            server: cmd.server_args.into(),
            database: cmd.sqlite_args.into(),
            scheduler: cmd.scheduler_args.into(),
            logs_file: cmd.logs_file,
        }
    }
}

/// Advisory values a worker uses until a heartbeat response replaces them.
#[derive(Debug, Clone, PartialEq)]
pub struct Advisory {
    pub ping_interval: Duration,
    pub request_interval: Duration,
    pub overdue_threshold: Duration,
    pub overdue_sleep: Duration,
}

impl Default for Advisory {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            request_interval: Duration::from_secs(1),
            overdue_threshold: Duration::from_secs(3600),
            overdue_sleep: Duration::from_secs(900),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerParams {
    pub worker_name: String,
    pub manager_url: Url,
    pub max_threads: usize,
    pub pending_dir: PathBuf,
    pub upload_batch_size: usize,
    pub max_page_size: u64,
    pub batch_size: u64,
    pub max_empty_streak: u32,
    pub max_backoff: Duration,
    pub manager_failure_threshold: u32,
    pub retry_interval: Duration,
    pub scale_interval: Duration,
    pub manager_retry_sleep: Duration,
    pub advisory: Advisory,
    pub domain_suffixes: Vec<String>,
}

impl WorkerParams {
    /// Parameters with the CLI defaults, for embedding a worker in another process.
    pub fn new(worker_name: impl Into<String>, manager_url: Url, pending_dir: PathBuf) -> Self {
        Self {
            worker_name: worker_name.into(),
            manager_url,
            max_threads: 4,
            pending_dir,
            upload_batch_size: 100,
            max_page_size: 256,
            batch_size: 16_000,
            max_empty_streak: 5,
            max_backoff: Duration::from_secs(60),
            manager_failure_threshold: 10,
            retry_interval: Duration::from_secs(30),
            scale_interval: Duration::from_secs(120),
            manager_retry_sleep: Duration::from_secs(10),
            advisory: Advisory::default(),
            domain_suffixes: Vec::new(),
        }
    }
}

impl From<WorkerCmd> for WorkerParams {
    fn from(cmd: WorkerCmd) -> Self {
        Self {
            worker_name: cmd.worker_name,
            manager_url: cmd.manager_url,
            max_threads: cmd.max_threads.max(1),
            pending_dir: cmd.pending_dir,
            upload_batch_size: cmd.upload_batch_size.max(1),
            max_page_size: cmd.max_page_size.max(1),
            batch_size: cmd.batch_size.max(1),
            max_empty_streak: cmd.max_empty_streak,
            max_backoff: Duration::from_secs(cmd.max_backoff_sec.max(1)),
            manager_failure_threshold: cmd.manager_failure_threshold.max(1),
            retry_interval: Duration::from_secs(cmd.retry_interval_sec.max(1)),
            scale_interval: Duration::from_secs(cmd.scale_interval_sec.max(1)),
            manager_retry_sleep: Duration::from_secs(cmd.manager_retry_sleep_sec),
            advisory: Advisory {
                ping_interval: Duration::from_secs(cmd.default_ping_interval_sec),
                request_interval: Duration::from_secs_f64(cmd.default_request_interval_sec.max(0.0)),
                overdue_threshold: Duration::from_secs(cmd.default_overdue_threshold_sec),
                overdue_sleep: Duration::from_secs(cmd.default_overdue_sleep_sec),
            },
            domain_suffixes: cmd.domain_suffixes,
        }
    }
}
