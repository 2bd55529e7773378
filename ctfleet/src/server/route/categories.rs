use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use super::super::types::{ApiRouteResult, CategoriesQuery};
use crate::core::config::ManagerConfig;
use crate::manager::categories::CategoryService;

async fn handle_categories(
    State(config): State<Arc<ManagerConfig>>,
    Query(query): Query<CategoriesQuery>,
) -> ApiRouteResult {
    let response = CategoryService::categories(&config, query.worker_name.as_deref()).await?;
    Ok(Json(response).into_response())
}

pub fn categories_router(config: Arc<ManagerConfig>) -> Router {
    Router::new().route("/categories", get(handle_categories)).with_state(config)
}
