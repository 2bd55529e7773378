use std::path::PathBuf;

use clap::Args;

use super::database::SqliteCliArgs;
use super::server::ServerCliArgs;

#[derive(Debug, Clone, Args)]
pub struct ManagerCmd {
    #[clap(flatten)]
    pub server_args: ServerCliArgs,

    #[clap(flatten)]
    pub sqlite_args: SqliteCliArgs,

    #[clap(flatten)]
    pub scheduler_args: SchedulerCliArgs,

    /// YAML file listing CT logs and category weights, loaded into the store at startup.
    #[arg(env = "CTFLEET_LOGS_FILE", long, value_name = "PATH")]
    pub logs_file: Option<PathBuf>,
}

/// Scheduler tuning. The defaults suit the public Google and Cloudflare logs.
#[derive(Debug, Clone, Args)]
#[group()]
pub struct SchedulerCliArgs {
    /// Number of log entries per batch.
    #[arg(env = "CTFLEET_BATCH_SIZE", long, default_value = "16000")]
    pub batch_size: u64,

    /// Seconds without a heartbeat before an assignment is declared dead.
    #[arg(env = "CTFLEET_DEAD_THRESHOLD_SEC", long, default_value = "300")]
    pub dead_threshold_sec: u64,

    /// A range is skipped once it has ended dead or failed more than this many times.
    #[arg(env = "CTFLEET_SKIP_THRESHOLD", long, default_value = "3")]
    pub skip_threshold: u64,

    #[arg(env = "CTFLEET_LIVENESS_INTERVAL_SEC", long, default_value = "60")]
    pub liveness_interval_sec: u64,

    /// Grace period after startup before the first liveness sweep.
    #[arg(env = "CTFLEET_LIVENESS_STARTUP_DELAY_SEC", long, default_value = "600")]
    pub liveness_startup_delay_sec: u64,

    #[arg(env = "CTFLEET_FRONTIER_TTL_SEC", long, default_value = "30")]
    pub frontier_ttl_sec: u64,

    #[arg(env = "CTFLEET_STH_POLL_INTERVAL_SEC", long, default_value = "300")]
    pub sth_poll_interval_sec: u64,

    /// Sleep hint returned when no log in a category has work left.
    #[arg(env = "CTFLEET_ALL_COMPLETED_SLEEP_SEC", long, default_value = "60")]
    pub all_completed_sleep_sec: u64,

    #[arg(env = "CTFLEET_PING_INTERVAL_SEC", long, default_value = "30")]
    pub ping_interval_sec: u64,

    #[arg(env = "CTFLEET_MIN_REQUEST_INTERVAL_SEC", long, default_value = "0.5")]
    pub min_request_interval_sec: f64,

    /// Fleet-wide request budget per log, shared by every worker fetching it.
    #[arg(env = "CTFLEET_MAX_REQUESTS_PER_SEC_PER_LOG", long, default_value = "4.0")]
    pub max_requests_per_sec_per_log: f64,

    #[arg(env = "CTFLEET_OVERDUE_THRESHOLD_SEC", long, default_value = "3600")]
    pub overdue_threshold_sec: u64,

    #[arg(env = "CTFLEET_OVERDUE_SLEEP_SEC", long, default_value = "900")]
    pub overdue_sleep_sec: u64,

    #[arg(env = "CTFLEET_KILL_NOW_SLEEP_SEC", long, default_value = "60")]
    pub kill_now_sleep_sec: u64,

    #[arg(env = "CTFLEET_FAILED_SLEEP_SEC", long, default_value = "120")]
    pub failed_sleep_sec: u64,

    #[arg(env = "CTFLEET_DEDUP_CACHE_CAPACITY", long, default_value = "500000")]
    pub dedup_cache_capacity: usize,

    /// Window used to spot workers that keep failing on the same log.
    #[arg(env = "CTFLEET_RECENT_FAILURE_WINDOW_SEC", long, default_value = "1800")]
    pub recent_failure_window_sec: u64,

    /// Dead/failed rows within the window before a log is avoided for that worker. 0 disables.
    #[arg(env = "CTFLEET_RECENT_FAILURE_LIMIT", long, default_value = "3")]
    pub recent_failure_limit: u64,
}
