use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::core::config::ManagerConfig;
use categories::categories_router;
use status::status_router;
use tasks::task_router;
use upload::upload_router;

pub(super) mod categories;
pub(super) mod status;
pub(super) mod tasks;
pub(super) mod upload;

/// Fallback for unmatched routes.
pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "The requested resource was not found")
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "UP")
}

pub(crate) fn server_router(config: Arc<ManagerConfig>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .merge(task_router(config.clone()))
        .merge(status_router(config.clone()))
        .merge(upload_router(config.clone()))
        .merge(categories_router(config))
        .fallback(handler_404)
}
