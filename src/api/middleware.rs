//! API Middleware
//!
//! Per-request [`ProcessingContext`] construction.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::ProcessingContext;

/// Header set by the request-id layer
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation ID from the request-id header, or a fresh one
pub fn correlation_id(headers: &HeaderMap) -> Uuid {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4)
}

/// Attach a [`ProcessingContext`] bounded by the request timeout
pub async fn context_middleware(
    State(request_timeout): State<Duration>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let context = ProcessingContext::new()
        .with_correlation_id(correlation_id(request.headers()))
        .with_timeout(request_timeout);

    request.extensions_mut().insert(context);

    next.run(request).await
}
