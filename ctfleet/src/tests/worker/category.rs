use std::sync::Arc;
use std::time::Duration;

use ctfleet_entry_parser::MockEntryParser;
use httpmock::prelude::*;
use rstest::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::tests::common::ping_response;
use crate::types::api::BatchDescriptor;
use crate::types::params::{Advisory, WorkerParams};
use crate::worker::category::CategoryRunner;
use crate::worker::client::ManagerClient;
use crate::worker::pending::PendingQueue;

async fn wait_for(mock: &httpmock::Mock<'_>, hits: usize) {
    for _ in 0..500 {
        if mock.hits() >= hits {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {hits} hits, got {}", mock.hits());
}

/// Once the manager keeps failing, the runner moves on to the next aligned
/// range of the last log it worked on.
#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_manager_outage_continues_on_a_regenerated_range() {
    let ct_log = MockServer::start();
    let entries: Vec<_> = (0..32).map(|_| json!({ "leaf_input": "AAAA", "extra_data": "" })).collect();
    let first_page = ct_log.mock(|when, then| {
        when.method(GET).path("/ct/v1/get-entries").query_param("start", "0");
        then.status(200).json_body(json!({ "entries": entries }));
    });
    let regenerated_page = ct_log.mock(|when, then| {
        when.method(GET).path("/ct/v1/get-entries").query_param("start", "32").query_param("end", "63");
        then.status(200).json_body(json!({ "entries": entries }));
    });

    let manager = MockServer::start();
    let assigned = BatchDescriptor {
        log_name: "argon".to_string(),
        ct_log_url: ct_log.base_url(),
        start: 0,
        end: 31,
        sth_end: 63,
        request_interval_sec: 0.0,
    };
    let mut next_task = manager.mock(|when, then| {
        when.method(GET).path("/next_task").query_param("category", "google");
        then.status(200).json_body(serde_json::to_value(&assigned).unwrap());
    });
    manager.mock(|when, then| {
        when.method(POST).path("/ping");
        then.status(200).json_body(serde_json::to_value(ping_response(0)).unwrap());
    });
    // Held open long enough to take the manager down before the next request.
    let assigned_done = manager.mock(|when, then| {
        when.method(POST).path("/completed").json_body_partial(r#"{"start": 0, "end": 31, "current": 32}"#);
        then.status(200).delay(Duration::from_millis(500)).json_body(json!({ "message": "completed" }));
    });
    let regenerated_done = manager.mock(|when, then| {
        when.method(POST)
            .path("/completed")
            .json_body_partial(r#"{"log_name": "argon", "start": 32, "end": 63, "current": 64, "status": "completed"}"#);
        then.status(200).json_body(json!({ "message": "completed" }));
    });

    let dir = tempfile::tempdir().unwrap();
    let mut params = WorkerParams::new("w1", Url::parse(&manager.base_url()).unwrap(), dir.path().to_path_buf());
    params.batch_size = 32;
    params.manager_failure_threshold = 2;
    params.manager_retry_sleep = Duration::from_millis(10);
    params.advisory = Advisory {
        ping_interval: Duration::ZERO,
        request_interval: Duration::ZERO,
        overdue_threshold: Duration::from_secs(3600),
        overdue_sleep: Duration::ZERO,
    };
    let queue = Arc::new(PendingQueue::new(dir.path()).unwrap());
    let client = Arc::new(ManagerClient::new(params.manager_url.clone(), queue).unwrap());
    let mut parser = MockEntryParser::new();
    parser.expect_parse().returning(|_| Ok(None));

    let token = CancellationToken::new();
    let runner =
        CategoryRunner::new("google".to_string(), Arc::new(params), client, Arc::new(parser), token.clone());
    let handle = tokio::spawn(runner.run());

    wait_for(&next_task, 1).await;
    next_task.delete();
    let outage = manager.mock(|when, then| {
        when.method(GET).path("/next_task");
        then.status(503).body("down");
    });

    wait_for(&regenerated_done, 1).await;
    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

    first_page.assert_hits(1);
    assigned_done.assert_hits(1);
    regenerated_page.assert_hits(1);
    regenerated_done.assert_hits(1);
    assert!(outage.hits() >= 2);
}
