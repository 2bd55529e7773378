/// Tables of the relational store.
///
/// `worker_status` holds one row per batch claim, so a range can have many
/// rows over time. `log_fetch_progress` holds the contiguous-prefix watermark
/// per (category, log). Timestamps are unix milliseconds.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    name TEXT PRIMARY KEY,
    weight INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS ct_logs (
    name TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    category TEXT NOT NULL,
    frozen INTEGER NOT NULL DEFAULT 0,
    fetch_completed INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS ct_log_sth (
    log_name TEXT PRIMARY KEY,
    tree_size INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS worker_status (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    worker_name TEXT NOT NULL,
    log_name TEXT NOT NULL,
    ct_log_url TEXT NOT NULL,
    range_start INTEGER NOT NULL,
    range_end INTEGER NOT NULL,
    current INTEGER NOT NULL,
    status TEXT NOT NULL,
    last_ping INTEGER,
    last_uploaded_index INTEGER,
    jp_count INTEGER NOT NULL DEFAULT 0,
    jp_ratio REAL NOT NULL DEFAULT 0,
    total_retries INTEGER NOT NULL DEFAULT 0,
    max_retry_after INTEGER NOT NULL DEFAULT 0,
    duration_sec REAL,
    ip_address TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_worker_status_log_end ON worker_status (log_name, range_end, status);
CREATE INDEX IF NOT EXISTS idx_worker_status_range ON worker_status (log_name, range_start, range_end);
CREATE INDEX IF NOT EXISTS idx_worker_status_status ON worker_status (status);

CREATE TABLE IF NOT EXISTS log_fetch_progress (
    category TEXT NOT NULL,
    log_name TEXT NOT NULL,
    min_completed_end INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (category, log_name)
);

CREATE TABLE IF NOT EXISTS worker_log_stats (
    worker_name TEXT NOT NULL,
    log_name TEXT NOT NULL,
    completed_batches INTEGER NOT NULL DEFAULT 0,
    jp_count_total INTEGER NOT NULL DEFAULT 0,
    entries_total INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (worker_name, log_name)
);

CREATE TABLE IF NOT EXISTS certificates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issuer TEXT NOT NULL,
    serial_number TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    subject TEXT NOT NULL,
    dns_names TEXT NOT NULL,
    entry_type TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    log_name TEXT NOT NULL,
    ct_log_url TEXT NOT NULL,
    log_index INTEGER NOT NULL,
    worker_name TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (issuer, serial_number, fingerprint)
);

CREATE TABLE IF NOT EXISTS worker_errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    worker_name TEXT NOT NULL,
    log_name TEXT NOT NULL,
    range_start INTEGER NOT NULL,
    range_end INTEGER NOT NULL,
    error_type TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
";
