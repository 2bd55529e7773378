use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use super::super::error::ApiRouteError;
use super::super::types::ApiRouteResult;
use crate::core::config::ManagerConfig;
use crate::manager::ingest::IngestService;
use crate::types::api::UploadItem;

/// `POST /upload` with a JSON array of items.
async fn handle_upload(
    State(config): State<Arc<ManagerConfig>>,
    payload: Result<Json<Vec<UploadItem>>, JsonRejection>,
) -> ApiRouteResult {
    let Json(items) = payload.map_err(|e| ApiRouteError::InvalidRequest(e.body_text()))?;
    let response = IngestService::upload(&config, items).await?;
    Ok(Json(response).into_response())
}

pub fn upload_router(config: Arc<ManagerConfig>) -> Router {
    Router::new().route("/upload", post(handle_upload)).with_state(config)
}
