use std::sync::Arc;

use rstest::*;

use crate::core::client::database::{DatabaseClient, SqliteClient};
use crate::core::config::ManagerConfig;
use crate::manager::ingest::IngestService;
use crate::tests::common::upload_item;
use crate::tests::config::TestConfigBuilder;
use crate::types::api::UploadResponse;
use crate::types::params::{SchedulerParams, ServerParams};

#[rstest]
#[tokio::test]
async fn test_upload_dedups_within_batch_and_across_batches() {
    let services = TestConfigBuilder::new().add_log("argon", "google").build().await;
    let config = services.config;

    let mut malformed = upload_item(3, "argon");
    malformed.entry.fingerprint.clear();
    let first = vec![upload_item(1, "argon"), upload_item(1, "argon"), upload_item(2, "argon"), malformed];
    let response = IngestService::upload(&config, first).await.unwrap();
    assert_eq!(response, UploadResponse { inserted: 2, skipped_duplicates: 1, rejected: 1 });

    let second = vec![upload_item(2, "argon"), upload_item(4, "argon")];
    let response = IngestService::upload(&config, second).await.unwrap();
    assert_eq!(response, UploadResponse { inserted: 1, skipped_duplicates: 1, rejected: 0 });

    assert_eq!(config.database().count_certificates().await.unwrap(), 3);
    assert_eq!(config.dedup_cache().len().unwrap(), 3);
}

#[rstest]
#[tokio::test]
async fn test_store_constraint_catches_duplicates_the_cache_missed() {
    let database: Arc<dyn DatabaseClient> = Arc::new(SqliteClient::open_in_memory().await.unwrap());
    let server = ServerParams { host: "127.0.0.1".to_string(), port: 0 };
    // Two managers over one store, as after a restart with a cold cache.
    let warm = ManagerConfig::new(server.clone(), SchedulerParams::default(), database.clone());
    let cold = ManagerConfig::new(server, SchedulerParams::default(), database.clone());

    IngestService::upload(&warm, vec![upload_item(1, "argon")]).await.unwrap();
    let response = IngestService::upload(&cold, vec![upload_item(1, "argon"), upload_item(2, "argon")]).await.unwrap();

    assert_eq!(response, UploadResponse { inserted: 1, skipped_duplicates: 1, rejected: 0 });
    assert_eq!(database.count_certificates().await.unwrap(), 2);
    // The duplicate is remembered so the next upload skips it without the store.
    assert_eq!(cold.dedup_cache().len().unwrap(), 2);
}

#[rstest]
#[tokio::test]
async fn test_item_without_log_name_is_rejected() {
    let services = TestConfigBuilder::new().build().await;
    let mut item = upload_item(1, "argon");
    item.log_name = String::new();

    let response = IngestService::upload(&services.config, vec![item]).await.unwrap();
    assert_eq!(response, UploadResponse { inserted: 0, skipped_duplicates: 0, rejected: 1 });
    assert_eq!(services.config.database().count_certificates().await.unwrap(), 0);
}

#[rstest]
#[tokio::test]
async fn test_empty_upload_is_a_no_op() {
    let services = TestConfigBuilder::new().build().await;

    let response = IngestService::upload(&services.config, Vec::new()).await.unwrap();
    assert_eq!(response, UploadResponse::default());
}
