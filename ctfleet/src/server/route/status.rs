use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::super::error::ApiRouteError;
use super::super::types::{ApiResponse, ApiRouteResult, WorkerErrorsQuery};
use crate::core::config::ManagerConfig;
use crate::manager::status::WorkerStatusService;
use crate::types::api::{StatusReport, WorkerErrorReport};

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiRouteError> {
    payload.map(|Json(value)| value).map_err(|e| ApiRouteError::InvalidRequest(e.body_text()))
}

fn peer(addr: SocketAddr) -> Option<String> {
    Some(addr.ip().to_string())
}

async fn handle_ping(
    State(config): State<Arc<ManagerConfig>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<StatusReport>, JsonRejection>,
) -> ApiRouteResult {
    let response = WorkerStatusService::ping(&config, body(payload)?, peer(addr)).await?;
    Ok(Json(response).into_response())
}

async fn handle_completed(
    State(config): State<Arc<ManagerConfig>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<StatusReport>, JsonRejection>,
) -> ApiRouteResult {
    let response = WorkerStatusService::completed(&config, body(payload)?, peer(addr)).await?;
    Ok(Json(response).into_response())
}

async fn handle_failed(
    State(config): State<Arc<ManagerConfig>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<StatusReport>, JsonRejection>,
) -> ApiRouteResult {
    let response = WorkerStatusService::failed(&config, body(payload)?, peer(addr)).await?;
    Ok(Json(response).into_response())
}

async fn handle_resume_request(
    State(config): State<Arc<ManagerConfig>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<StatusReport>, JsonRejection>,
) -> ApiRouteResult {
    let response = WorkerStatusService::resume_request(&config, body(payload)?, peer(addr)).await?;
    Ok(Json(response).into_response())
}

async fn handle_worker_error(
    State(config): State<Arc<ManagerConfig>>,
    payload: Result<Json<WorkerErrorReport>, JsonRejection>,
) -> ApiRouteResult {
    let response = WorkerStatusService::worker_error(&config, body(payload)?).await?;
    Ok(Json(response).into_response())
}

/// Operator view of the most recent worker error events.
async fn handle_list_worker_errors(
    State(config): State<Arc<ManagerConfig>>,
    Query(query): Query<WorkerErrorsQuery>,
) -> ApiRouteResult {
    let errors = config.database().list_worker_errors(query.limit).await.map_err(crate::error::FleetError::from)?;
    let count = errors.len();
    Ok(Json(ApiResponse::success_with_data(errors, Some(format!("{count} worker errors")))).into_response())
}

pub fn status_router(config: Arc<ManagerConfig>) -> Router {
    Router::new()
        .route("/ping", post(handle_ping))
        .route("/completed", post(handle_completed))
        .route("/failed", post(handle_failed))
        .route("/resume_request", post(handle_resume_request))
        .route("/worker_error", post(handle_worker_error))
        .route("/worker_errors", get(handle_list_worker_errors))
        .with_state(config)
}
