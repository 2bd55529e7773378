use std::collections::HashMap;
use std::sync::Arc;

use ctfleet_entry_parser::MockEntryParser;
use httpmock::prelude::*;
use rstest::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::types::params::WorkerParams;
use crate::worker::client::ManagerClient;
use crate::worker::controller::CategoryThreadManager;
use crate::worker::pending::PendingQueue;

fn mock_categories<'a>(server: &'a MockServer, ordered: &[&str]) -> httpmock::Mock<'a> {
    let mut all: Vec<&str> = ordered.to_vec();
    all.sort();
    all.dedup();
    let body = json!({ "all_categories": all, "ordered_categories": ordered });
    server.mock(move |when, then| {
        when.method(GET).path("/categories").query_param("worker_name", "w1");
        then.status(200).json_body(body);
    })
}

fn controller(server: &MockServer, dir: &tempfile::TempDir, max_threads: usize) -> CategoryThreadManager {
    let mut params = WorkerParams::new("w1", Url::parse(&server.base_url()).unwrap(), dir.path().to_path_buf());
    params.max_threads = max_threads;
    let queue = Arc::new(PendingQueue::new(dir.path()).unwrap());
    let client = Arc::new(ManagerClient::new(params.manager_url.clone(), queue).unwrap());
    CategoryThreadManager::new(Arc::new(params), client, Arc::new(MockEntryParser::new()), CancellationToken::new())
}

#[rstest]
#[tokio::test]
async fn test_runners_follow_category_weights() {
    let server = MockServer::start();
    // Runners find nothing to do and idle.
    server.mock(|when, then| {
        when.method(GET).path("/next_task");
        then.status(200).json_body(json!({ "message": "all logs completed", "sleep_sec": 60 }));
    });
    let mut categories = mock_categories(&server, &["google", "google", "cloudflare"]);
    let dir = tempfile::tempdir().unwrap();
    let mut controller = controller(&server, &dir, 4);

    controller.reconcile().await;
    assert_eq!(
        controller.running_counts(),
        HashMap::from([("google".to_string(), 3), ("cloudflare".to_string(), 1)])
    );

    categories.delete();
    mock_categories(&server, &["cloudflare"]);
    controller.reconcile().await;
    assert_eq!(controller.running_counts(), HashMap::from([("cloudflare".to_string(), 4)]));

    controller.shutdown().await;
    assert!(controller.running_counts().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_manager_outage_keeps_current_runners() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/next_task");
        then.status(200).json_body(json!({ "message": "all logs completed", "sleep_sec": 60 }));
    });
    let mut categories = mock_categories(&server, &["google"]);
    let dir = tempfile::tempdir().unwrap();
    let mut controller = controller(&server, &dir, 2);

    controller.reconcile().await;
    assert_eq!(controller.running_counts(), HashMap::from([("google".to_string(), 2)]));

    categories.delete();
    server.mock(|when, then| {
        when.method(GET).path("/categories");
        then.status(503);
    });
    controller.reconcile().await;
    assert_eq!(controller.running_counts(), HashMap::from([("google".to_string(), 2)]));

    controller.shutdown().await;
}
