use std::sync::Arc;

use reqwest::StatusCode;
use rstest::*;
use serde_json::json;

use crate::core::client::database::{DatabaseError, MockDatabaseClient};
use crate::server::types::ApiResponse;
use crate::tests::common::{report_for, upload_item};
use crate::tests::config::{TestConfigBuilder, TestManager};
use crate::types::api::{
    BatchDescriptor, CategoriesResponse, FailedResponse, MessageResponse, NextTaskResponse, PingResponse,
    UploadResponse, WorkerErrorReport,
};
use crate::types::batch::{BatchKey, BatchStatus};

async fn manager_with_one_log() -> TestManager {
    TestConfigBuilder::new()
        .add_category("google", 2)
        .add_log("argon", "google")
        .with_tree_size("argon", 100)
        .configure_api_server()
        .build()
        .await
}

async fn next_task(services: &TestManager, worker_name: &str) -> BatchDescriptor {
    let response = reqwest::Client::new()
        .get(services.url("next_task"))
        .query(&[("worker_name", worker_name), ("category", "google")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    match response.json::<NextTaskResponse>().await.unwrap() {
        NextTaskResponse::Assigned(batch) => batch,
        other => panic!("expected an assignment, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn test_health_endpoint() {
    let services = manager_with_one_log().await;

    let response = reqwest::get(services.url("health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "UP");
}

#[rstest]
#[tokio::test]
async fn test_unknown_route_is_404() {
    let services = manager_with_one_log().await;

    let response = reqwest::get(services.url("no_such_route")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test]
async fn test_next_task_records_the_peer_address() {
    let services = manager_with_one_log().await;

    let batch = next_task(&services, "w1").await;
    assert_eq!((batch.start, batch.end, batch.sth_end), (0, 31, 99));

    let rows =
        services.config.database().assignments_for_range(&BatchKey::new("argon", 0, 31)).await.unwrap();
    assert_eq!(rows[0].ip_address.as_deref(), Some("127.0.0.1"));
}

#[rstest]
#[tokio::test]
async fn test_next_task_for_unknown_category_is_404_with_envelope() {
    let services = manager_with_one_log().await;

    let response = reqwest::Client::new()
        .get(services.url("next_task"))
        .query(&[("worker_name", "w1"), ("category", "nowhere")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: ApiResponse<serde_json::Value> = response.json().await.unwrap();
    assert!(!body.success);
    assert!(body.message.unwrap().contains("nowhere"));
}

#[rstest]
#[tokio::test]
async fn test_next_task_without_worker_name_is_400() {
    let services = manager_with_one_log().await;

    let response = reqwest::Client::new()
        .get(services.url("next_task"))
        .query(&[("category", "google")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test]
async fn test_batch_lifecycle_over_http() {
    let services = manager_with_one_log().await;
    let client = reqwest::Client::new();
    let batch = next_task(&services, "w1").await;

    let mut report = report_for("w1", &batch);
    report.current = 16;
    report.jp_count = 2;
    let response = client.post(services.url("ping")).json(&report).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let advisory: PingResponse = response.json().await.unwrap();
    assert_eq!(advisory.kill_now_sleep_sec, 0);

    report.current = batch.end + 1;
    report.status = Some(BatchStatus::Completed);
    let response = client.post(services.url("completed")).json(&report).send().await.unwrap();
    assert_eq!(response.json::<MessageResponse>().await.unwrap().message, "completed");

    let rows =
        services.config.database().assignments_for_range(&BatchKey::new("argon", 0, 31)).await.unwrap();
    assert_eq!(rows[0].status, BatchStatus::Completed);
    assert_eq!(rows[0].jp_count, 2);
}

#[rstest]
#[tokio::test]
async fn test_failed_and_resume_request_over_http() {
    let services = manager_with_one_log().await;
    let client = reqwest::Client::new();
    let first = next_task(&services, "w1").await;
    let second = next_task(&services, "w1").await;

    let response = client.post(services.url("failed")).json(&report_for("w1", &first)).send().await.unwrap();
    assert_eq!(response.json::<FailedResponse>().await.unwrap().failed_sleep_sec, 7);

    let response =
        client.post(services.url("resume_request")).json(&report_for("w1", &second)).send().await.unwrap();
    assert_eq!(response.json::<MessageResponse>().await.unwrap().message, "resume_wait");
}

#[rstest]
#[tokio::test]
async fn test_malformed_status_body_is_400() {
    let services = manager_with_one_log().await;

    let response = reqwest::Client::new()
        .post(services.url("ping"))
        .json(&json!({ "worker_name": "w1", "start": "zero" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ApiResponse<serde_json::Value> = response.json().await.unwrap();
    assert!(!body.success);
}

#[rstest]
#[tokio::test]
async fn test_upload_over_http() {
    let services = manager_with_one_log().await;
    let items = vec![upload_item(1, "argon"), upload_item(1, "argon"), upload_item(2, "argon")];

    let response = reqwest::Client::new().post(services.url("upload")).json(&items).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: UploadResponse = response.json().await.unwrap();
    assert_eq!(body, UploadResponse { inserted: 2, skipped_duplicates: 1, rejected: 0 });
}

#[rstest]
#[tokio::test]
async fn test_categories_over_http() {
    let services = manager_with_one_log().await;

    let response = reqwest::Client::new()
        .get(services.url("categories"))
        .query(&[("worker_name", "w1")])
        .send()
        .await
        .unwrap();
    let body: CategoriesResponse = response.json().await.unwrap();
    assert_eq!(body.all_categories, vec!["google".to_string()]);
    assert_eq!(body.ordered_categories, vec!["google".to_string(), "google".to_string()]);
}

#[rstest]
#[tokio::test]
async fn test_worker_errors_are_recorded_and_listed() {
    let services = manager_with_one_log().await;
    let client = reqwest::Client::new();
    let event = WorkerErrorReport {
        worker_name: "w1".to_string(),
        log_name: "argon".to_string(),
        start: 0,
        end: 31,
        error_type: "decode_error".to_string(),
        message: "bad json".to_string(),
    };

    let response = client.post(services.url("worker_error")).json(&event).send().await.unwrap();
    assert_eq!(response.json::<MessageResponse>().await.unwrap().message, "recorded");

    let response = client.get(services.url("worker_errors")).send().await.unwrap();
    let body: ApiResponse<Vec<WorkerErrorReport>> = response.json().await.unwrap();
    assert!(body.success);
    assert_eq!(body.data.unwrap(), vec![event]);
}

#[rstest]
#[tokio::test]
async fn test_store_failure_is_500() {
    let mut database = MockDatabaseClient::new();
    database
        .expect_logs_in_category()
        .returning(|_| Err(DatabaseError::Poisoned("connection mutex".to_string())));
    let services =
        TestConfigBuilder::new().configure_database(Arc::new(database)).configure_api_server().build().await;

    let response = reqwest::Client::new()
        .get(services.url("next_task"))
        .query(&[("worker_name", "w1"), ("category", "google")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ApiResponse<serde_json::Value> = response.json().await.unwrap();
    assert!(!body.success);
}

#[rstest]
#[tokio::test]
async fn test_server_shuts_down_gracefully() {
    let services = manager_with_one_log().await;
    let url = services.url("health");

    services.server.unwrap().shutdown().await.unwrap();
    assert!(reqwest::get(url).await.is_err());
}

#[rstest]
#[tokio::test]
async fn test_ping_with_cursor_past_the_range_is_400() {
    let services = manager_with_one_log().await;
    let batch = next_task(&services, "w1").await;

    let mut report = report_for("w1", &batch);
    report.current = batch.end + 500;
    let response = reqwest::Client::new().post(services.url("ping")).json(&report).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ApiResponse<serde_json::Value> = response.json().await.unwrap();
    assert!(body.message.unwrap().contains("current"));

    let rows = services.config.database().assignments_for_range(&BatchKey::new("argon", 0, 31)).await.unwrap();
    assert_eq!(rows[0].current, 0);
}
