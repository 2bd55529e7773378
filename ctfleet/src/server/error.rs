use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use super::types::ApiResponse;
use crate::error::FleetError;

#[derive(Error, Debug)]
pub enum ApiRouteError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FleetError> for ApiRouteError {
    fn from(err: FleetError) -> Self {
        match err {
            FleetError::InvalidRequest(message) => ApiRouteError::InvalidRequest(message),
            FleetError::UnknownCategory(category) => ApiRouteError::NotFound(format!("category {category}")),
            FleetError::UnknownLog(log_name) => ApiRouteError::NotFound(format!("log {log_name}")),
            other => ApiRouteError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiRouteError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiRouteError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiRouteError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiRouteError::Internal(message) => {
                error!(error = %message, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ApiResponse::error(self.to_string()))).into_response()
    }
}
