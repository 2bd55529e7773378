use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rstest::*;

use crate::manager::allocator::TaskAllocator;
use crate::manager::liveness::{LivenessMonitor, SweepSummary};
use crate::manager::status::WorkerStatusService;
use crate::tests::common::{assign, report_for, rows};
use crate::tests::config::TestConfigBuilder;
use crate::types::api::NextTaskResponse;
use crate::types::batch::BatchStatus;

fn past_dead_threshold(dead_threshold_sec: u64) -> chrono::DateTime<Utc> {
    Utc::now() + Duration::seconds(dead_threshold_sec as i64 + 60)
}

#[rstest]
#[tokio::test]
async fn test_fresh_rows_are_left_alone() {
    let services = TestConfigBuilder::new().add_log("argon", "google").with_tree_size("argon", 100).build().await;
    let config = services.config;
    assign(&config, "w1", "google").await;

    let summary = LivenessMonitor::sweep(&config).await.unwrap();
    assert_eq!(summary, SweepSummary::default());
    assert_eq!(rows(&config, "argon", 0, 31).await[0].status, BatchStatus::Running);
}

#[rstest]
#[tokio::test]
async fn test_silent_worker_is_declared_dead_and_range_reoffered() {
    let services = TestConfigBuilder::new().add_log("argon", "google").with_tree_size("argon", 100).build().await;
    let config = services.config;
    let batch = assign(&config, "w1", "google").await;

    let later = past_dead_threshold(config.scheduler().dead_threshold_sec);
    let summary = LivenessMonitor::sweep_at(&config, later).await.unwrap();
    assert_eq!(summary, SweepSummary { dead: 1, skipped: 0 });
    assert_eq!(rows(&config, "argon", 0, 31).await[0].status, BatchStatus::Dead);

    let again = assign(&config, "w2", "google").await;
    assert_eq!((again.start, again.end), (batch.start, batch.end));
}

#[rstest]
#[tokio::test]
async fn test_resume_wait_rows_expire_too() {
    let services = TestConfigBuilder::new().add_log("argon", "google").with_tree_size("argon", 100).build().await;
    let config = services.config;
    let batch = assign(&config, "w1", "google").await;
    WorkerStatusService::resume_request(&config, report_for("w1", &batch), None).await.unwrap();

    let later = past_dead_threshold(config.scheduler().dead_threshold_sec);
    LivenessMonitor::sweep_at(&config, later).await.unwrap();
    assert_eq!(rows(&config, "argon", 0, 31).await[0].status, BatchStatus::Dead);
}

#[rstest]
#[tokio::test]
async fn test_range_that_keeps_dying_is_skipped_for_good() {
    let services = TestConfigBuilder::new()
        .configure_scheduler(|s| s.skip_threshold = 1)
        .add_log("argon", "google")
        .with_tree_size("argon", 100)
        .build()
        .await;
    let config = services.config;
    let later = past_dead_threshold(config.scheduler().dead_threshold_sec);

    assign(&config, "w1", "google").await;
    assert_eq!(LivenessMonitor::sweep_at(&config, later).await.unwrap(), SweepSummary { dead: 1, skipped: 0 });

    let retry = assign(&config, "w2", "google").await;
    assert_eq!((retry.start, retry.end), (0, 31));
    assert_eq!(LivenessMonitor::sweep_at(&config, later).await.unwrap(), SweepSummary { dead: 0, skipped: 1 });
    assert_eq!(rows(&config, "argon", 0, 31).await[0].status, BatchStatus::Skipped);

    let mut handed_out = Vec::new();
    for worker in ["w3", "w4", "w5"] {
        let batch = assign(&config, worker, "google").await;
        handed_out.push((batch.start, batch.end));
    }
    assert_eq!(handed_out, vec![(32, 63), (64, 95), (96, 99)]);
    let response = TaskAllocator::next_task(&config, "w6", "google", None).await.unwrap();
    assert_matches!(response, NextTaskResponse::AllCompleted { .. });
}

#[rstest]
#[tokio::test]
async fn test_explicitly_failed_range_is_skipped_once_chronic() {
    let services = TestConfigBuilder::new()
        .configure_scheduler(|s| s.skip_threshold = 1)
        .add_log("argon", "google")
        .with_tree_size("argon", 100)
        .build()
        .await;
    let config = services.config;

    for worker in ["w1", "w2"] {
        let batch = assign(&config, worker, "google").await;
        assert_eq!((batch.start, batch.end), (0, 31));
        WorkerStatusService::failed(&config, report_for(worker, &batch), None).await.unwrap();
    }

    let summary = LivenessMonitor::sweep(&config).await.unwrap();
    assert_eq!(summary, SweepSummary { dead: 0, skipped: 1 });
    // A second pass finds nothing new.
    assert_eq!(LivenessMonitor::sweep(&config).await.unwrap(), SweepSummary::default());

    let next = assign(&config, "w3", "google").await;
    assert_eq!((next.start, next.end), (32, 63));
}
