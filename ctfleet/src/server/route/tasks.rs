use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tracing::instrument;

use super::super::types::{ApiRouteResult, NextTaskQuery};
use crate::core::config::ManagerConfig;
use crate::manager::allocator::TaskAllocator;

/// `GET /next_task?worker_name&category`
#[instrument(skip(config, addr), fields(worker = %query.worker_name, category = %query.category))]
async fn handle_next_task(
    State(config): State<Arc<ManagerConfig>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<NextTaskQuery>,
) -> ApiRouteResult {
    let response =
        TaskAllocator::next_task(&config, &query.worker_name, &query.category, Some(addr.ip().to_string())).await?;
    Ok(Json(response).into_response())
}

pub fn task_router(config: Arc<ManagerConfig>) -> Router {
    Router::new().route("/next_task", get(handle_next_task)).with_state(config)
}
