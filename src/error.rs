//! Error handling module
//!
//! HTTP-facing error type and its response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::repository::RepositoryError;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    // Server errors (5xx)
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            // 404 Not Found
            AppError::OrderNotFound(order_uid) => {
                tracing::debug!(order_uid = %order_uid, "Order not found");
                "Order not found"
            }

            // 500 Internal Server Error; details stay in the logs
            AppError::Repository(e) => {
                tracing::error!(error = %e, "Repository error");
                "Internal server error"
            }
        };

        let body = ErrorResponse {
            error: message.to_string(),
        };

        (self.status(), Json(body)).into_response()
    }
}
