use assert_matches::assert_matches;
use rstest::*;

use crate::error::FleetError;
use crate::manager::status::WorkerStatusService;
use crate::tests::common::{assign, report, report_for, rows};
use crate::tests::config::TestConfigBuilder;
use crate::types::api::WorkerErrorReport;
use crate::types::batch::BatchStatus;

#[rstest]
#[tokio::test]
async fn test_ping_records_progress_and_returns_advisory() {
    let services = TestConfigBuilder::new().add_log("argon", "google").with_tree_size("argon", 100).build().await;
    let config = services.config;
    let batch = assign(&config, "w1", "google").await;

    let mut heartbeat = report_for("w1", &batch);
    heartbeat.current = 20;
    heartbeat.jp_count = 3;
    heartbeat.total_retries = 2;
    let response = WorkerStatusService::ping(&config, heartbeat, Some("10.0.0.9".to_string())).await.unwrap();

    assert_eq!(response.kill_now_sleep_sec, 0);
    assert_eq!(response.ping_interval_sec, config.scheduler().ping_interval_sec);
    assert_eq!(response.overdue_threshold_sec, config.scheduler().overdue_threshold_sec);

    let rows = rows(&config, "argon", 0, 31).await;
    assert_eq!(rows[0].status, BatchStatus::Running);
    assert_eq!(rows[0].current, 20);
    assert_eq!(rows[0].jp_count, 3);
    assert_eq!(rows[0].total_retries, 2);
    assert_eq!(rows[0].ip_address.as_deref(), Some("10.0.0.9"));
}

#[rstest]
#[tokio::test]
async fn test_ping_after_completion_does_not_revive_the_range() {
    let services = TestConfigBuilder::new().add_log("argon", "google").with_tree_size("argon", 100).build().await;
    let config = services.config;
    let batch = assign(&config, "w1", "google").await;

    let mut done = report_for("w1", &batch);
    done.current = batch.end + 1;
    WorkerStatusService::completed(&config, done, None).await.unwrap();

    // A heartbeat that sat in the pending queue arrives late.
    let response = WorkerStatusService::ping(&config, report_for("w1", &batch), None).await.unwrap();
    assert_eq!(response.kill_now_sleep_sec, 5);

    let rows = rows(&config, "argon", 0, 31).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, BatchStatus::Completed);
    assert_eq!(rows[0].current, 32);
}

#[rstest]
#[tokio::test]
async fn test_ping_after_resume_request_does_not_revive_the_range() {
    let services = TestConfigBuilder::new().add_log("argon", "google").with_tree_size("argon", 100).build().await;
    let config = services.config;
    let batch = assign(&config, "w1", "google").await;

    WorkerStatusService::resume_request(&config, report_for("w1", &batch), None).await.unwrap();
    let response = WorkerStatusService::ping(&config, report_for("w1", &batch), None).await.unwrap();

    assert!(response.kill_now_sleep_sec > 0);
    assert_eq!(rows(&config, "argon", 0, 31).await[0].status, BatchStatus::ResumeWait);
}

#[rstest]
#[tokio::test]
async fn test_ping_from_a_worker_that_lost_the_range_is_killed() {
    let services = TestConfigBuilder::new().add_log("argon", "google").with_tree_size("argon", 100).build().await;
    let config = services.config;
    let batch = assign(&config, "w1", "google").await;

    let response = WorkerStatusService::ping(&config, report_for("intruder", &batch), None).await.unwrap();
    assert_eq!(response.kill_now_sleep_sec, 5);

    let response = WorkerStatusService::ping(&config, report_for("w1", &batch), None).await.unwrap();
    assert_eq!(response.kill_now_sleep_sec, 0);
}

#[rstest]
#[tokio::test]
async fn test_ping_for_an_unknown_range_adopts_it() {
    let services = TestConfigBuilder::new().add_log("argon", "google").with_tree_size("argon", 1000).build().await;
    let config = services.config;

    let mut heartbeat = report("w1", "argon", 320, 351);
    heartbeat.current = 330;
    let response = WorkerStatusService::ping(&config, heartbeat, None).await.unwrap();
    assert_eq!(response.kill_now_sleep_sec, 0);

    let rows = rows(&config, "argon", 320, 351).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, BatchStatus::Running);
    assert_eq!(rows[0].ct_log_url, "https://ct.example/argon");
}

#[rstest]
#[tokio::test]
async fn test_adopting_a_range_of_an_unknown_log_fails() {
    let services = TestConfigBuilder::new().add_log("argon", "google").build().await;

    let result = WorkerStatusService::ping(&services.config, report("w1", "ghost", 0, 31), None).await;
    assert_matches!(result, Err(FleetError::UnknownLog(name)) if name == "ghost");
}

#[rstest]
#[tokio::test]
async fn test_inverted_range_is_an_invalid_request() {
    let services = TestConfigBuilder::new().add_log("argon", "google").build().await;

    let result = WorkerStatusService::ping(&services.config, report("w1", "argon", 64, 32), None).await;
    assert_matches!(result, Err(FleetError::InvalidRequest(_)));
}

#[rstest]
#[tokio::test]
async fn test_stats_are_folded_once_with_final_values() {
    let services = TestConfigBuilder::new().add_log("argon", "google").with_tree_size("argon", 100).build().await;
    let config = services.config;
    let batch = assign(&config, "w1", "google").await;

    for jp_count in [5, 9] {
        let mut heartbeat = report_for("w1", &batch);
        heartbeat.jp_count = jp_count;
        WorkerStatusService::ping(&config, heartbeat, None).await.unwrap();
    }
    assert!(config.database().worker_log_stats("w1", "argon").await.unwrap().is_none());

    let mut done = report_for("w1", &batch);
    done.current = batch.end + 1;
    done.jp_count = 12;
    let first = WorkerStatusService::completed(&config, done.clone(), None).await.unwrap();
    let second = WorkerStatusService::completed(&config, done, None).await.unwrap();
    assert_eq!(first.message, "completed");
    assert_eq!(second.message, "already completed");

    let stats = config.database().worker_log_stats("w1", "argon").await.unwrap().unwrap();
    assert_eq!(stats.completed_batches, 1);
    assert_eq!(stats.jp_count_total, 12);
    assert_eq!(stats.entries_total, 32);
}

#[rstest]
#[tokio::test]
async fn test_completion_of_a_never_assigned_range_is_adopted() {
    let services = TestConfigBuilder::new().add_log("argon", "google").with_tree_size("argon", 1000).build().await;
    let config = services.config;

    let mut done = report("w1", "argon", 64, 95);
    done.current = 96;
    done.ct_log_url = Some("https://mirror.example/argon".to_string());
    let response = WorkerStatusService::completed(&config, done, None).await.unwrap();
    assert_eq!(response.message, "completed");

    let rows = rows(&config, "argon", 64, 95).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, BatchStatus::Completed);
    assert_eq!(rows[0].ct_log_url, "https://mirror.example/argon");
}

#[rstest]
#[tokio::test]
async fn test_resume_request_without_live_row_is_acknowledged() {
    let services = TestConfigBuilder::new().add_log("argon", "google").with_tree_size("argon", 100).build().await;

    let response =
        WorkerStatusService::resume_request(&services.config, report("w1", "argon", 0, 31), None).await.unwrap();
    assert_eq!(response.message, "no live assignment");
    assert!(rows(&services.config, "argon", 0, 31).await.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_failed_marks_the_row_and_returns_the_sleep() {
    let services = TestConfigBuilder::new().add_log("argon", "google").with_tree_size("argon", 100).build().await;
    let config = services.config;
    let batch = assign(&config, "w1", "google").await;

    let response = WorkerStatusService::failed(&config, report_for("w1", &batch), None).await.unwrap();
    assert_eq!(response.failed_sleep_sec, 7);
    assert_eq!(rows(&config, "argon", 0, 31).await[0].status, BatchStatus::Failed);
}

#[rstest]
#[tokio::test]
async fn test_worker_error_is_stored() {
    let services = TestConfigBuilder::new().add_log("argon", "google").build().await;
    let event = WorkerErrorReport {
        worker_name: "w1".to_string(),
        log_name: "argon".to_string(),
        start: 0,
        end: 31,
        error_type: "client_error".to_string(),
        message: "CT log rejected get_entries (status 403 Forbidden): denied".to_string(),
    };

    let response = WorkerStatusService::worker_error(&services.config, event.clone()).await.unwrap();
    assert_eq!(response.message, "recorded");
    assert_eq!(services.config.database().list_worker_errors(10).await.unwrap(), vec![event]);
}

#[rstest]
#[case::before_start(31)]
#[case::past_end(65)]
#[case::far_past_end(563)]
#[tokio::test]
async fn test_cursor_outside_the_range_is_an_invalid_request(#[case] current: u64) {
    let services = TestConfigBuilder::new().add_log("argon", "google").with_tree_size("argon", 100).build().await;
    let config = services.config;
    assign(&config, "w1", "google").await;
    let batch = assign(&config, "w1", "google").await;
    assert_eq!((batch.start, batch.end), (32, 63));

    let mut heartbeat = report_for("w1", &batch);
    heartbeat.current = current;
    let result = WorkerStatusService::ping(&config, heartbeat.clone(), None).await;
    assert_matches!(result, Err(FleetError::InvalidRequest(message)) if message.contains("current"));
    let result = WorkerStatusService::completed(&config, heartbeat, None).await;
    assert_matches!(result, Err(FleetError::InvalidRequest(_)));

    let rows = rows(&config, "argon", 32, 63).await;
    assert_eq!(rows[0].status, BatchStatus::Running);
    assert_eq!(rows[0].current, 32);
}
