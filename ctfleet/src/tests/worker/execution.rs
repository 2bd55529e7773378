use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ctfleet_ct_log_client::{CtLogError, FetchOutcome, MockCtLogSource};
use ctfleet_entry_parser::{MockEntryParser, RawLogEntry};
use httpmock::prelude::*;
use reqwest::StatusCode;
use rstest::*;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::tests::common::{certificate, ping_response};
use crate::types::api::BatchDescriptor;
use crate::types::params::Advisory;
use crate::worker::client::ManagerClient;
use crate::worker::execution::{BatchExecutor, BatchOutcome, LoopSettings};
use crate::worker::pending::PendingQueue;

const PAGE: u64 = 4;

fn batch() -> BatchDescriptor {
    BatchDescriptor {
        log_name: "argon".to_string(),
        ct_log_url: "https://ct.example/argon".to_string(),
        start: 0,
        end: 9,
        sth_end: 99,
        request_interval_sec: 0.0,
    }
}

fn raw(index: u64) -> RawLogEntry {
    RawLogEntry { leaf_input: format!("leaf{index}"), extra_data: String::new() }
}

/// Serves up to `PAGE` entries per call, like a log with a small page size.
fn paged_source() -> MockCtLogSource {
    let mut source = MockCtLogSource::new();
    source
        .expect_get_entries()
        .returning(|start, end| Ok(FetchOutcome::Entries((start..=end.min(start + PAGE - 1)).map(raw).collect())));
    source
}

/// Even indices are interesting, odd ones are not.
fn even_parser() -> MockEntryParser {
    let mut parser = MockEntryParser::new();
    parser.expect_parse().returning(|entry| {
        let index: u64 = entry.leaf_input.trim_start_matches("leaf").parse().unwrap();
        Ok((index % 2 == 0).then(|| certificate(index)))
    });
    parser
}

fn quiet_advisory() -> Advisory {
    Advisory {
        ping_interval: Duration::ZERO,
        request_interval: Duration::ZERO,
        overdue_threshold: Duration::from_secs(3600),
        overdue_sleep: Duration::ZERO,
    }
}

fn executor(
    manager_url: &str,
    source: MockCtLogSource,
    parser: MockEntryParser,
    max_empty_streak: u32,
    token: CancellationToken,
) -> (BatchExecutor, Arc<PendingQueue>, TempDir) {
    executor_with(manager_url, source, parser, max_empty_streak, quiet_advisory(), token)
}

fn executor_with(
    manager_url: &str,
    source: MockCtLogSource,
    parser: MockEntryParser,
    max_empty_streak: u32,
    advisory: Advisory,
    token: CancellationToken,
) -> (BatchExecutor, Arc<PendingQueue>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(PendingQueue::new(dir.path()).unwrap());
    let client = Arc::new(ManagerClient::new(Url::parse(manager_url).unwrap(), queue.clone()).unwrap());
    let settings = LoopSettings {
        worker_name: "w1".to_string(),
        upload_batch_size: 100,
        max_empty_streak,
        max_backoff: Duration::from_secs(1),
    };
    let executor = BatchExecutor::new(settings, client, Arc::new(parser), Arc::new(source), advisory, token);
    (executor, queue, dir)
}

fn mock_ping(server: &MockServer, kill_now_sleep_sec: u64) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST).path("/ping").json_body_partial(r#"{"worker_name": "w1", "status": "running"}"#);
        then.status(200).json_body(serde_json::to_value(ping_response(kill_now_sleep_sec)).unwrap());
    })
}

fn mock_upload(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST).path("/upload");
        then.status(200).json_body(json!({ "inserted": 5, "skipped_duplicates": 0, "rejected": 0 }));
    })
}

fn mock_message<'a>(
    server: &'a MockServer,
    path: &str,
    expected: serde_json::Value,
    message: &str,
) -> httpmock::Mock<'a> {
    let expected = expected.to_string();
    let message = message.to_string();
    server.mock(move |when, then| {
        when.method(POST).path(path.to_string()).json_body_partial(expected);
        then.status(200).json_body(json!({ "message": message }));
    })
}

#[rstest]
#[tokio::test]
async fn test_batch_is_scanned_uploaded_and_completed() {
    let server = MockServer::start();
    let ping = mock_ping(&server, 0);
    let upload = mock_upload(&server);
    let completed = mock_message(
        &server,
        "/completed",
        json!({ "current": 10, "jp_count": 5, "last_uploaded_index": 8, "status": "completed" }),
        "completed",
    );

    let (mut executor, queue, _dir) =
        executor(&server.base_url(), paged_source(), even_parser(), 3, CancellationToken::new());
    let outcome = executor.run(&batch()).await;

    assert_eq!(outcome, BatchOutcome::Completed);
    // One heartbeat per page: [0, 3], [4, 7], [8, 9].
    ping.assert_hits(3);
    upload.assert_hits(1);
    completed.assert_hits(1);
    assert!(queue.is_empty().unwrap());
}

#[rstest]
#[tokio::test]
async fn test_need_tree_size_completes_early() {
    let server = MockServer::start();
    mock_ping(&server, 0);
    mock_upload(&server);
    let completed = mock_message(&server, "/completed", json!({ "current": 4, "jp_count": 2 }), "completed");

    let mut source = MockCtLogSource::new();
    source.expect_get_entries().returning(|start, _| {
        if start == 0 {
            Ok(FetchOutcome::Entries((0..PAGE).map(raw).collect()))
        } else {
            Ok(FetchOutcome::NeedTreeSize)
        }
    });
    let (mut executor, _queue, _dir) =
        executor(&server.base_url(), source, even_parser(), 3, CancellationToken::new());

    assert_eq!(executor.run(&batch()).await, BatchOutcome::Completed);
    completed.assert_hits(1);
}

#[rstest]
#[tokio::test]
async fn test_too_many_empty_pages_fail_the_batch() {
    let server = MockServer::start();
    let ping = mock_ping(&server, 0);
    let failed = server.mock(|when, then| {
        when.method(POST).path("/failed").json_body_partial(r#"{"current": 0, "status": "failed"}"#);
        then.status(200).json_body(json!({ "failed_sleep_sec": 0 }));
    });

    let mut source = MockCtLogSource::new();
    source.expect_get_entries().times(1).returning(|_, _| Ok(FetchOutcome::Entries(Vec::new())));
    let mut parser = MockEntryParser::new();
    parser.expect_parse().never();
    let (mut executor, _queue, _dir) = executor(&server.base_url(), source, parser, 0, CancellationToken::new());

    assert_eq!(executor.run(&batch()).await, BatchOutcome::Failed);
    failed.assert_hits(1);
    ping.assert_hits(0);
}

#[rstest]
#[tokio::test]
async fn test_empty_page_heartbeats_and_retries() {
    let server = MockServer::start();
    let ping = mock_ping(&server, 0);
    mock_upload(&server);
    let completed = mock_message(&server, "/completed", json!({ "current": 10 }), "completed");

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut source = MockCtLogSource::new();
    source.expect_get_entries().returning(move |start, end| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(FetchOutcome::Entries(Vec::new()));
        }
        Ok(FetchOutcome::Entries((start..=end).map(raw).collect()))
    });
    let (mut executor, _queue, _dir) =
        executor(&server.base_url(), source, even_parser(), 2, CancellationToken::new());

    assert_eq!(executor.run(&batch()).await, BatchOutcome::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // The forced heartbeat after the empty page, then the regular one.
    ping.assert_hits(2);
    completed.assert_hits(1);
}

#[rstest]
#[tokio::test]
async fn test_rate_limit_is_waited_out_and_reported() {
    let server = MockServer::start();
    mock_ping(&server, 0);
    mock_upload(&server);
    let completed = mock_message(
        &server,
        "/completed",
        json!({ "current": 10, "total_retries": 1, "max_retry_after": 1 }),
        "completed",
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut source = MockCtLogSource::new();
    source.expect_get_entries().returning(move |start, end| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(CtLogError::RateLimited { operation: "get_entries", retry_after: Some(Duration::from_secs(1)) });
        }
        Ok(FetchOutcome::Entries((start..=end).map(raw).collect()))
    });
    let (mut executor, _queue, _dir) =
        executor(&server.base_url(), source, even_parser(), 3, CancellationToken::new());

    assert_eq!(executor.run(&batch()).await, BatchOutcome::Completed);
    completed.assert_hits(1);
}

#[rstest]
#[tokio::test]
async fn test_manager_kill_stops_the_batch() {
    let server = MockServer::start();
    mock_ping(&server, 1);
    let upload = mock_upload(&server);
    let completed = mock_message(&server, "/completed", json!({}), "completed");

    let (mut executor, _queue, _dir) =
        executor(&server.base_url(), paged_source(), even_parser(), 3, CancellationToken::new());

    assert_eq!(executor.run(&batch()).await, BatchOutcome::Killed);
    // Parsed entries are not thrown away.
    upload.assert_hits(1);
    completed.assert_hits(0);
}

#[rstest]
#[tokio::test]
async fn test_shutdown_reports_resume_wait() {
    let server = MockServer::start();
    let resume = mock_message(&server, "/resume_request", json!({ "current": 0, "status": "resume_wait" }), "resume_wait");

    let mut source = MockCtLogSource::new();
    source.expect_get_entries().never();
    let token = CancellationToken::new();
    token.cancel();
    let (mut executor, _queue, _dir) = executor(&server.base_url(), source, MockEntryParser::new(), 3, token);

    assert_eq!(executor.run(&batch()).await, BatchOutcome::Stopped);
    resume.assert_hits(1);
}

#[rstest]
#[tokio::test]
async fn test_overdue_batch_is_handed_back() {
    let server = MockServer::start();
    mock_ping(&server, 0);
    mock_upload(&server);
    let resume = mock_message(
        &server,
        "/resume_request",
        json!({ "worker_name": "w1", "start": 0, "end": 9, "status": "resume_wait" }),
        "resume_wait",
    );
    let completed = mock_message(&server, "/completed", json!({}), "completed");

    // A slow log: every page takes longer than the whole batch may.
    let mut source = MockCtLogSource::new();
    source.expect_get_entries().returning(|start, end| {
        std::thread::sleep(Duration::from_millis(20));
        Ok(FetchOutcome::Entries((start..=end.min(start + PAGE - 1)).map(raw).collect()))
    });
    let advisory = Advisory { overdue_threshold: Duration::from_millis(5), ..quiet_advisory() };
    let (mut executor, _queue, _dir) =
        executor_with(&server.base_url(), source, even_parser(), 3, advisory, CancellationToken::new());

    assert_eq!(executor.run(&batch()).await, BatchOutcome::Overdue);
    resume.assert_hits(1);
    completed.assert_hits(0);
}

#[rstest]
#[tokio::test]
async fn test_fatal_log_error_is_reported_as_an_event() {
    let server = MockServer::start();
    let event = mock_message(
        &server,
        "/worker_error",
        json!({ "worker_name": "w1", "log_name": "argon", "error_type": "client_error" }),
        "recorded",
    );
    let resume = mock_message(&server, "/resume_request", json!({ "status": "resume_wait" }), "resume_wait");

    let mut source = MockCtLogSource::new();
    source.expect_get_entries().times(1).returning(|_, _| {
        Err(CtLogError::Client { operation: "get_entries", status: StatusCode::FORBIDDEN, body: "denied".to_string() })
    });
    let (mut executor, _queue, _dir) =
        executor(&server.base_url(), source, MockEntryParser::new(), 3, CancellationToken::new());

    assert_eq!(executor.run(&batch()).await, BatchOutcome::Errored);
    event.assert_hits(1);
    resume.assert_hits(1);
}

#[rstest]
#[tokio::test]
async fn test_unreachable_manager_queues_every_report() {
    // Nothing listens on port 1.
    let (mut executor, queue, dir) =
        executor("http://127.0.0.1:1", paged_source(), even_parser(), 3, CancellationToken::new());

    assert_eq!(executor.run(&batch()).await, BatchOutcome::Completed);

    let names: Vec<String> = queue
        .list()
        .unwrap()
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.iter().filter(|name| name.starts_with("ping_")).count(), 3);
    assert_eq!(names.iter().filter(|name| name.starts_with("upload_")).count(), 1);
    assert_eq!(names.iter().filter(|name| name.starts_with("completed_")).count(), 1);
    assert!(dir.path().exists());
}
