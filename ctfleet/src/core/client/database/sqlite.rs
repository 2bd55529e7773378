use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ctfleet_entry_parser::LogEntryType;
use rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, Transaction};
use tracing::{debug, warn};

use super::constant::SCHEMA;
use super::{DatabaseClient, DatabaseError};
use crate::types::api::WorkerErrorReport;
use crate::types::batch::{BatchAssignment, BatchKey, BatchStatus, NewAssignment, ProgressUpdate, WorkerLogStats};
use crate::types::certificate::{CertificateRecord, InsertOutcome};
use crate::types::log::{CategoryWeight, CtLog, TreeSize};

/// Rows whose `range_end` keeps the range from being handed out again. A
/// completed row whose cursor stopped short of its end leaves the range open.
const HOLDS_RANGE: &str = "(status IN ('running', 'skipped') OR (status = 'completed' AND current > range_end))";

const ASSIGNMENT_COLUMNS: &str = "id, worker_name, log_name, ct_log_url, range_start, range_end, current, status, \
     last_ping, last_uploaded_index, jp_count, jp_ratio, total_retries, max_retry_after, duration_sec, ip_address, \
     created_at";

/// `DatabaseClient` backed by a single SQLite connection.
///
/// Every call runs on the blocking pool while holding the connection mutex,
/// so each method body is atomic with respect to the others.
#[derive(Clone)]
pub struct SqliteClient {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteClient {
    /// Opens (or creates) the database at `path` and applies the schema.
    /// `:memory:` opens a private in-memory database.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let conn = if path == ":memory:" { Connection::open_in_memory() } else { Connection::open(path) }
            .map_err(|e| DatabaseError::Open { path: path.to_string(), message: e.to_string() })?;
        let client = Self { conn: Arc::new(Mutex::new(conn)) };
        client.migrate().await?;
        Ok(client)
    }

    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::open(":memory:").await
    }

    async fn run<T, F>(&self, f: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, DatabaseError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|e| DatabaseError::Poisoned(e.to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| DatabaseError::Join(e.to_string()))?
    }
}

fn to_sql_int(column: &'static str, value: u64) -> Result<i64, DatabaseError> {
    i64::try_from(value).map_err(|_| DatabaseError::OutOfRange { column, value })
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(value: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value).unwrap_or_default()
}

fn status_list(statuses: &[BatchStatus]) -> String {
    statuses.iter().map(|s| format!("'{}'", s.as_ref())).collect::<Vec<_>>().join(", ")
}

fn entry_type_str(entry_type: LogEntryType) -> &'static str {
    match entry_type {
        LogEntryType::X509 => "x509",
        LogEntryType::Precert => "precert",
    }
}

fn map_assignment(row: &Row<'_>) -> rusqlite::Result<BatchAssignment> {
    let status: String = row.get(7)?;
    let status = BatchStatus::from_str(&status)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;
    Ok(BatchAssignment {
        id: row.get(0)?,
        worker_name: row.get(1)?,
        log_name: row.get(2)?,
        ct_log_url: row.get(3)?,
        start: row.get::<_, i64>(4)? as u64,
        end: row.get::<_, i64>(5)? as u64,
        current: row.get::<_, i64>(6)? as u64,
        status,
        last_ping: row.get::<_, Option<i64>>(8)?.map(from_millis),
        last_uploaded_index: row.get::<_, Option<i64>>(9)?.map(|v| v as u64),
        jp_count: row.get::<_, i64>(10)? as u64,
        jp_ratio: row.get(11)?,
        total_retries: row.get::<_, i64>(12)? as u64,
        max_retry_after: row.get::<_, i64>(13)? as u64,
        duration_sec: row.get(14)?,
        ip_address: row.get(15)?,
        created_at: from_millis(row.get(16)?),
    })
}

fn map_log(row: &Row<'_>) -> rusqlite::Result<CtLog> {
    Ok(CtLog {
        name: row.get(0)?,
        url: row.get(1)?,
        category: row.get(2)?,
        frozen: row.get(3)?,
        fetch_completed: row.get(4)?,
    })
}

fn insert_assignment_tx(tx: &Transaction<'_>, new: &NewAssignment) -> Result<BatchAssignment, DatabaseError> {
    let now = Utc::now();
    tx.execute(
        "INSERT INTO worker_status (worker_name, log_name, ct_log_url, range_start, range_end, current, status, \
         last_ping, ip_address, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            new.worker_name,
            new.log_name,
            new.ct_log_url,
            to_sql_int("range_start", new.start)?,
            to_sql_int("range_end", new.end)?,
            to_sql_int("current", new.current)?,
            new.status.as_ref(),
            millis(now),
            new.ip_address,
            millis(now),
        ],
    )?;
    let id = tx.last_insert_rowid();
    let row = tx.query_row(
        &format!("SELECT {ASSIGNMENT_COLUMNS} FROM worker_status WHERE id = ?1"),
        params![id],
        map_assignment,
    )?;
    Ok(row)
}

fn insert_certificate(tx: &Transaction<'_>, record: &CertificateRecord, now: i64) -> Result<(), DatabaseError> {
    let dns_names = serde_json::to_string(&record.dns_names)
        .map_err(|e| DatabaseError::Encode { column: "dns_names", message: e.to_string() })?;
    tx.execute(
        "INSERT INTO certificates (issuer, serial_number, fingerprint, subject, dns_names, entry_type, timestamp, \
         log_name, ct_log_url, log_index, worker_name, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            record.identity.issuer,
            record.identity.serial_number,
            record.identity.fingerprint,
            record.subject,
            dns_names,
            entry_type_str(record.entry_type),
            to_sql_int("timestamp", record.timestamp)?,
            record.log_name,
            record.ct_log_url,
            to_sql_int("log_index", record.log_index)?,
            record.worker_name,
            now,
        ],
    )?;
    Ok(())
}

fn is_unique_violation(err: &DatabaseError) -> bool {
    matches!(
        err,
        DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation && e.extended_code == SQLITE_CONSTRAINT_UNIQUE
    )
}

fn ends_query(conn: &Connection, sql: &str, log_name: &str, after: Option<u64>) -> Result<HashSet<u64>, DatabaseError> {
    let after = match after {
        Some(after) => to_sql_int("range_end", after)?,
        None => -1,
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![log_name, after], |row| row.get::<_, i64>(0))?;
    let mut ends = HashSet::new();
    for end in rows {
        ends.insert(end? as u64);
    }
    Ok(ends)
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    async fn migrate(&self) -> Result<(), DatabaseError> {
        self.run(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
    }

    async fn upsert_category(&self, category: CategoryWeight) -> Result<(), DatabaseError> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO categories (name, weight) VALUES (?1, ?2) \
                 ON CONFLICT(name) DO UPDATE SET weight = excluded.weight",
                params![category.name, category.weight],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_categories(&self) -> Result<Vec<CategoryWeight>, DatabaseError> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT name, weight FROM categories ORDER BY name")?;
            let rows = stmt.query_map([], |row| Ok(CategoryWeight { name: row.get(0)?, weight: row.get(1)? }))?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn upsert_log(&self, log: CtLog) -> Result<(), DatabaseError> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO ct_logs (name, url, category, frozen, fetch_completed) VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(name) DO UPDATE SET url = excluded.url, category = excluded.category, \
                 frozen = excluded.frozen",
                params![log.name, log.url, log.category, log.frozen, log.fetch_completed],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_logs(&self) -> Result<Vec<CtLog>, DatabaseError> {
        self.run(|conn| {
            let mut stmt =
                conn.prepare("SELECT name, url, category, frozen, fetch_completed FROM ct_logs ORDER BY name")?;
            let rows = stmt.query_map([], map_log)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn logs_in_category(&self, category: &str) -> Result<Vec<CtLog>, DatabaseError> {
        let category = category.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT name, url, category, frozen, fetch_completed FROM ct_logs WHERE category = ?1 ORDER BY name",
            )?;
            let rows = stmt.query_map(params![category], map_log)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn get_log(&self, name: &str) -> Result<Option<CtLog>, DatabaseError> {
        let name = name.to_string();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT name, url, category, frozen, fetch_completed FROM ct_logs WHERE name = ?1",
                    params![name],
                    map_log,
                )
                .optional()?)
        })
        .await
    }

    async fn mark_log_fetch_completed(&self, name: &str) -> Result<(), DatabaseError> {
        let name = name.to_string();
        self.run(move |conn| {
            conn.execute("UPDATE ct_logs SET fetch_completed = 1 WHERE name = ?1", params![name])?;
            Ok(())
        })
        .await
    }

    async fn get_tree_size(&self, log_name: &str) -> Result<Option<TreeSize>, DatabaseError> {
        let log_name = log_name.to_string();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT tree_size, updated_at FROM ct_log_sth WHERE log_name = ?1",
                    params![log_name],
                    |row| {
                        Ok(TreeSize {
                            tree_size: row.get::<_, i64>(0)? as u64,
                            updated_at: from_millis(row.get(1)?),
                        })
                    },
                )
                .optional()?)
        })
        .await
    }

    async fn record_tree_size(&self, log_name: &str, tree_size: u64) -> Result<bool, DatabaseError> {
        let log_name = log_name.to_string();
        self.run(move |conn| {
            let changed = conn.execute(
                "INSERT INTO ct_log_sth (log_name, tree_size, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(log_name) DO UPDATE SET tree_size = excluded.tree_size, updated_at = excluded.updated_at \
                 WHERE excluded.tree_size > ct_log_sth.tree_size",
                params![log_name, to_sql_int("tree_size", tree_size)?, millis(Utc::now())],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn claim_range(&self, new: NewAssignment) -> Result<Option<BatchAssignment>, DatabaseError> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let taken: bool = tx.query_row(
                &format!(
                    "SELECT EXISTS(SELECT 1 FROM worker_status WHERE log_name = ?1 AND range_end = ?2 AND {HOLDS_RANGE})"
                ),
                params![new.log_name, to_sql_int("range_end", new.end)?],
                |row| row.get(0),
            )?;
            if taken {
                debug!(log_name = %new.log_name, end = new.end, "Range already claimed");
                return Ok(None);
            }
            let assignment = insert_assignment_tx(&tx, &new)?;
            tx.commit()?;
            Ok(Some(assignment))
        })
        .await
    }

    async fn insert_assignment(&self, new: NewAssignment) -> Result<BatchAssignment, DatabaseError> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let assignment = insert_assignment_tx(&tx, &new)?;
            tx.commit()?;
            Ok(assignment)
        })
        .await
    }

    async fn get_assignment(&self, id: i64) -> Result<Option<BatchAssignment>, DatabaseError> {
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {ASSIGNMENT_COLUMNS} FROM worker_status WHERE id = ?1"),
                    params![id],
                    map_assignment,
                )
                .optional()?)
        })
        .await
    }

    async fn assignments_for_range(&self, key: &BatchKey) -> Result<Vec<BatchAssignment>, DatabaseError> {
        let key = key.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM worker_status \
                 WHERE log_name = ?1 AND range_start = ?2 AND range_end = ?3 ORDER BY id DESC"
            ))?;
            let rows = stmt.query_map(
                params![key.log_name, to_sql_int("range_start", key.start)?, to_sql_int("range_end", key.end)?],
                map_assignment,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn live_assignments(&self) -> Result<Vec<BatchAssignment>, DatabaseError> {
        self.run(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM worker_status WHERE status IN ({}) ORDER BY id",
                status_list(&BatchStatus::LIVE)
            ))?;
            let rows = stmt.query_map([], map_assignment)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn claimed_ends(&self, log_name: &str, after: Option<u64>) -> Result<HashSet<u64>, DatabaseError> {
        let log_name = log_name.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT DISTINCT range_end FROM worker_status WHERE log_name = ?1 AND range_end > ?2 AND {HOLDS_RANGE}"
            );
            ends_query(conn, &sql, &log_name, after)
        })
        .await
    }

    async fn completed_ends(&self, log_name: &str, after: Option<u64>) -> Result<HashSet<u64>, DatabaseError> {
        let log_name = log_name.to_string();
        self.run(move |conn| {
            let sql = "SELECT DISTINCT range_end FROM worker_status \
                       WHERE log_name = ?1 AND range_end > ?2 AND status = 'completed' AND current > range_end";
            ends_query(conn, sql, &log_name, after)
        })
        .await
    }

    async fn update_progress(
        &self,
        id: i64,
        progress: ProgressUpdate,
        status: BatchStatus,
        from: &[BatchStatus],
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let from = status_list(from);
        self.run(move |conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE worker_status SET current = ?2, status = ?3, last_ping = ?4, last_uploaded_index = ?5, \
                     jp_count = ?6, jp_ratio = ?7, total_retries = ?8, max_retry_after = ?9, \
                     ip_address = COALESCE(?10, ip_address) \
                     WHERE id = ?1 AND status IN ({from})"
                ),
                params![
                    id,
                    to_sql_int("current", progress.current)?,
                    status.as_ref(),
                    millis(at),
                    progress.last_uploaded_index.map(|v| to_sql_int("last_uploaded_index", v)).transpose()?,
                    to_sql_int("jp_count", progress.jp_count)?,
                    progress.jp_ratio,
                    to_sql_int("total_retries", progress.total_retries)?,
                    to_sql_int("max_retry_after", progress.max_retry_after)?,
                    progress.ip_address,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn complete_assignment(
        &self,
        id: i64,
        progress: ProgressUpdate,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let row = tx
                .query_row(
                    &format!("SELECT {ASSIGNMENT_COLUMNS} FROM worker_status WHERE id = ?1"),
                    params![id],
                    map_assignment,
                )
                .optional()?;
            let Some(row) = row else { return Ok(false) };
            if row.status == BatchStatus::Completed {
                return Ok(false);
            }

            let duration_sec = (at - row.created_at).num_milliseconds().max(0) as f64 / 1000.0;
            tx.execute(
                "UPDATE worker_status SET status = 'completed', current = ?2, last_ping = ?3, \
                 last_uploaded_index = ?4, jp_count = ?5, jp_ratio = ?6, total_retries = ?7, max_retry_after = ?8, \
                 duration_sec = ?9, ip_address = COALESCE(?10, ip_address) WHERE id = ?1",
                params![
                    id,
                    to_sql_int("current", progress.current)?,
                    millis(at),
                    progress.last_uploaded_index.map(|v| to_sql_int("last_uploaded_index", v)).transpose()?,
                    to_sql_int("jp_count", progress.jp_count)?,
                    progress.jp_ratio,
                    to_sql_int("total_retries", progress.total_retries)?,
                    to_sql_int("max_retry_after", progress.max_retry_after)?,
                    duration_sec,
                    progress.ip_address,
                ],
            )?;
            tx.execute(
                "INSERT INTO worker_log_stats (worker_name, log_name, completed_batches, jp_count_total, entries_total) \
                 VALUES (?1, ?2, 1, ?3, ?4) \
                 ON CONFLICT(worker_name, log_name) DO UPDATE SET \
                 completed_batches = completed_batches + 1, \
                 jp_count_total = jp_count_total + excluded.jp_count_total, \
                 entries_total = entries_total + excluded.entries_total",
                params![
                    row.worker_name,
                    row.log_name,
                    to_sql_int("jp_count", progress.jp_count)?,
                    to_sql_int("entries_total", progress.current.min(row.end + 1).saturating_sub(row.start))?,
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn transition_status(&self, id: i64, from: &[BatchStatus], to: BatchStatus) -> Result<bool, DatabaseError> {
        let from = status_list(from);
        self.run(move |conn| {
            let changed = conn.execute(
                &format!("UPDATE worker_status SET status = ?2 WHERE id = ?1 AND status IN ({from})"),
                params![id, to.as_ref()],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn count_failures(&self, key: &BatchKey) -> Result<u64, DatabaseError> {
        let key = key.clone();
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM worker_status WHERE log_name = ?1 AND range_start = ?2 AND range_end = ?3 \
                     AND status IN ({})",
                    status_list(&BatchStatus::FAILURES)
                ),
                params![key.log_name, to_sql_int("range_start", key.start)?, to_sql_int("range_end", key.end)?],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn chronic_ranges(&self, threshold: u64) -> Result<Vec<BatchKey>, DatabaseError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT log_name, range_start, range_end FROM worker_status \
                 GROUP BY log_name, range_start, range_end \
                 HAVING SUM(CASE WHEN status IN ({failures}) THEN 1 ELSE 0 END) > ?1 \
                 AND SUM(CASE WHEN {HOLDS_RANGE} THEN 1 ELSE 0 END) = 0",
                failures = status_list(&BatchStatus::FAILURES),
            ))?;
            let rows = stmt.query_map(params![to_sql_int("skip_threshold", threshold)?], |row| {
                Ok(BatchKey::new(row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64, row.get::<_, i64>(2)? as u64))
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn skip_latest_failure(&self, key: &BatchKey) -> Result<bool, DatabaseError> {
        let key = key.clone();
        self.run(move |conn| {
            let failures = status_list(&BatchStatus::FAILURES);
            let changed = conn.execute(
                &format!(
                    "UPDATE worker_status SET status = 'skipped' WHERE id = (\
                     SELECT id FROM worker_status WHERE log_name = ?1 AND range_start = ?2 AND range_end = ?3 \
                     AND status IN ({failures}) ORDER BY id DESC LIMIT 1)"
                ),
                params![key.log_name, to_sql_int("range_start", key.start)?, to_sql_int("range_end", key.end)?],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn count_running_on_log(&self, log_name: &str) -> Result<u64, DatabaseError> {
        let log_name = log_name.to_string();
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM worker_status WHERE log_name = ?1 AND status = 'running'",
                params![log_name],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn recent_failures(
        &self,
        worker_name: &str,
        log_name: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let worker_name = worker_name.to_string();
        let log_name = log_name.to_string();
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM worker_status WHERE worker_name = ?1 AND log_name = ?2 \
                     AND status IN ({}) AND COALESCE(last_ping, created_at) >= ?3",
                    status_list(&BatchStatus::FAILURES)
                ),
                params![worker_name, log_name, millis(since)],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn get_frontier(&self, category: &str, log_name: &str) -> Result<Option<u64>, DatabaseError> {
        let category = category.to_string();
        let log_name = log_name.to_string();
        self.run(move |conn| {
            let value: Option<i64> = conn
                .query_row(
                    "SELECT min_completed_end FROM log_fetch_progress WHERE category = ?1 AND log_name = ?2",
                    params![category, log_name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.map(|v| v as u64))
        })
        .await
    }

    async fn set_frontier(&self, category: &str, log_name: &str, end: u64) -> Result<(), DatabaseError> {
        let category = category.to_string();
        let log_name = log_name.to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO log_fetch_progress (category, log_name, min_completed_end, updated_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(category, log_name) DO UPDATE SET \
                 min_completed_end = MAX(min_completed_end, excluded.min_completed_end), \
                 updated_at = excluded.updated_at",
                params![category, log_name, to_sql_int("min_completed_end", end)?, millis(Utc::now())],
            )?;
            Ok(())
        })
        .await
    }

    async fn worker_log_stats(
        &self,
        worker_name: &str,
        log_name: &str,
    ) -> Result<Option<WorkerLogStats>, DatabaseError> {
        let worker_name = worker_name.to_string();
        let log_name = log_name.to_string();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT worker_name, log_name, completed_batches, jp_count_total, entries_total \
                     FROM worker_log_stats WHERE worker_name = ?1 AND log_name = ?2",
                    params![worker_name, log_name],
                    |row| {
                        Ok(WorkerLogStats {
                            worker_name: row.get(0)?,
                            log_name: row.get(1)?,
                            completed_batches: row.get::<_, i64>(2)? as u64,
                            jp_count_total: row.get::<_, i64>(3)? as u64,
                            entries_total: row.get::<_, i64>(4)? as u64,
                        })
                    },
                )
                .optional()?)
        })
        .await
    }

    async fn insert_certificates(&self, records: Vec<CertificateRecord>) -> Result<InsertOutcome, DatabaseError> {
        if records.is_empty() {
            return Ok(InsertOutcome::default());
        }
        self.run(move |conn| {
            let now = millis(Utc::now());

            let batch_result = (|| {
                let tx = conn.transaction()?;
                for record in &records {
                    insert_certificate(&tx, record, now)?;
                }
                tx.commit()?;
                Ok::<_, DatabaseError>(())
            })();

            match batch_result {
                Ok(()) => {
                    return Ok(InsertOutcome {
                        inserted: records.into_iter().map(|r| r.identity).collect(),
                        duplicates: Vec::new(),
                    })
                }
                Err(e) if is_unique_violation(&e) => {
                    debug!(records = records.len(), "Batch insert hit the uniqueness constraint, inserting one by one");
                }
                Err(e) => return Err(e),
            }

            let mut outcome = InsertOutcome::default();
            for record in records {
                let tx = conn.transaction()?;
                match insert_certificate(&tx, &record, now) {
                    Ok(()) => {
                        tx.commit()?;
                        outcome.inserted.push(record.identity);
                    }
                    Err(e) if is_unique_violation(&e) => outcome.duplicates.push(record.identity),
                    Err(e) => {
                        warn!(error = %e, issuer = %record.identity.issuer, "Failed to insert certificate");
                        return Err(e);
                    }
                }
            }
            Ok(outcome)
        })
        .await
    }

    async fn count_certificates(&self) -> Result<u64, DatabaseError> {
        self.run(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM certificates", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn insert_worker_error(&self, report: WorkerErrorReport) -> Result<(), DatabaseError> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO worker_errors (worker_name, log_name, range_start, range_end, error_type, message, \
                 created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    report.worker_name,
                    report.log_name,
                    to_sql_int("range_start", report.start)?,
                    to_sql_int("range_end", report.end)?,
                    report.error_type,
                    report.message,
                    millis(Utc::now()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_worker_errors(&self, limit: u32) -> Result<Vec<WorkerErrorReport>, DatabaseError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT worker_name, log_name, range_start, range_end, error_type, message \
                 FROM worker_errors ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(WorkerErrorReport {
                    worker_name: row.get(0)?,
                    log_name: row.get(1)?,
                    start: row.get::<_, i64>(2)? as u64,
                    end: row.get::<_, i64>(3)? as u64,
                    error_type: row.get(4)?,
                    message: row.get(5)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}
