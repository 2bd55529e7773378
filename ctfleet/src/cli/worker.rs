use std::path::PathBuf;

use clap::Args;
use url::Url;

#[derive(Debug, Clone, Args)]
pub struct WorkerCmd {
    /// Name this worker reports to the manager. Must be unique across the fleet.
    #[arg(env = "CTFLEET_WORKER_NAME", long)]
    pub worker_name: String,

    #[arg(env = "CTFLEET_MANAGER_URL", long, default_value = "http://127.0.0.1:8080")]
    pub manager_url: Url,

    /// Upper bound on concurrently running category runners.
    #[arg(env = "CTFLEET_MAX_THREADS", long, default_value = "4")]
    pub max_threads: usize,

    /// Directory holding requests that could not be delivered to the manager.
    #[arg(env = "CTFLEET_PENDING_DIR", long, default_value = "pending_requests")]
    pub pending_dir: PathBuf,

    #[arg(env = "CTFLEET_UPLOAD_BATCH_SIZE", long, default_value = "100")]
    pub upload_batch_size: usize,

    /// Largest `get-entries` page requested from a log.
    #[arg(env = "CTFLEET_MAX_PAGE_SIZE", long, default_value = "256")]
    pub max_page_size: u64,

    /// Batch size the manager uses. Only needed to align ranges the worker
    /// regenerates on its own while the manager is unreachable.
    #[arg(env = "CTFLEET_BATCH_SIZE", long, default_value = "16000")]
    pub batch_size: u64,

    /// Consecutive empty pages tolerated before the batch is declared failed.
    #[arg(env = "CTFLEET_MAX_EMPTY_STREAK", long, default_value = "5")]
    pub max_empty_streak: u32,

    #[arg(env = "CTFLEET_MAX_BACKOFF_SEC", long, default_value = "60")]
    pub max_backoff_sec: u64,

    /// Consecutive manager failures before the worker starts regenerating ranges on its own.
    #[arg(env = "CTFLEET_MANAGER_FAILURE_THRESHOLD", long, default_value = "10")]
    pub manager_failure_threshold: u32,

    #[arg(env = "CTFLEET_RETRY_INTERVAL_SEC", long, default_value = "30")]
    pub retry_interval_sec: u64,

    #[arg(env = "CTFLEET_SCALE_INTERVAL_SEC", long, default_value = "120")]
    pub scale_interval_sec: u64,

    /// Sleep between `next_task` attempts while the manager is unreachable.
    #[arg(env = "CTFLEET_MANAGER_RETRY_SLEEP_SEC", long, default_value = "10")]
    pub manager_retry_sleep_sec: u64,

    #[arg(env = "CTFLEET_DEFAULT_PING_INTERVAL_SEC", long, default_value = "30")]
    pub default_ping_interval_sec: u64,

    #[arg(env = "CTFLEET_DEFAULT_REQUEST_INTERVAL_SEC", long, default_value = "1.0")]
    pub default_request_interval_sec: f64,

    #[arg(env = "CTFLEET_DEFAULT_OVERDUE_THRESHOLD_SEC", long, default_value = "3600")]
    pub default_overdue_threshold_sec: u64,

    #[arg(env = "CTFLEET_DEFAULT_OVERDUE_SLEEP_SEC", long, default_value = "900")]
    pub default_overdue_sleep_sec: u64,

    /// Certificates are uploaded only when a DNS name ends with one of these suffixes.
    /// Empty means every certificate is interesting.
    #[arg(env = "CTFLEET_DOMAIN_SUFFIX", long = "domain-suffix", value_delimiter = ',')]
    pub domain_suffixes: Vec<String>,
}
