use axum::response::Response;
use serde::{Deserialize, Serialize};

use super::error::ApiRouteError;

/// Envelope for error bodies and the operator endpoints.
///
/// The worker protocol bodies (`next_task`, `ping`, ...) are returned bare so
/// that workers deserialize them directly.
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T = ()> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        Self { success: false, data: None, message: Some(message) }
    }
}

impl<T> ApiResponse<T> {
    pub fn success_with_data(data: T, message: Option<String>) -> Self {
        Self { success: true, data: Some(data), message }
    }

    pub fn success(message: Option<String>) -> Self {
        Self { success: true, data: None, message }
    }
}

pub type ApiRouteResult<T = Response> = Result<T, ApiRouteError>;

#[derive(Deserialize, Debug)]
pub struct NextTaskQuery {
    pub worker_name: String,
    pub category: String,
}

#[derive(Deserialize, Debug)]
pub struct CategoriesQuery {
    #[serde(default)]
    pub worker_name: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct WorkerErrorsQuery {
    #[serde(default = "default_error_limit")]
    pub limit: u32,
}

fn default_error_limit() -> u32 {
    100
}
