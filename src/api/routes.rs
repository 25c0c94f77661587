//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, State},
    middleware,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::domain::{Order, ProcessingContext};
use crate::error::AppError;
use crate::repository::OrderStore;
use crate::service::OrderService;

use super::middleware::context_middleware;

// =========================================================================
// Shared state
// =========================================================================

/// State shared by every request
pub struct AppState<S> {
    pub orders: Arc<OrderService<S>>,
    pub request_timeout: Duration,
}

impl<S> AppState<S> {
    pub fn new(orders: Arc<OrderService<S>>, request_timeout: Duration) -> Self {
        Self {
            orders,
            request_timeout,
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            orders: Arc::clone(&self.orders),
            request_timeout: self.request_timeout,
        }
    }
}

// =========================================================================
// API Router
// =========================================================================

/// Create the application router
pub fn create_router<S: OrderStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/order/:order_uid", get(get_order::<S>))
        .route("/health", get(health_check))
        .layer(middleware::from_fn_with_state(
            state.request_timeout,
            context_middleware,
        ))
        // Outermost first: assign id, trace, echo id on the response
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

// =========================================================================
// GET /order/:order_uid
// =========================================================================

/// Get order by uid
async fn get_order<S: OrderStore + 'static>(
    State(state): State<AppState<S>>,
    Extension(context): Extension<ProcessingContext>,
    Path(order_uid): Path<String>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.get_order(&order_uid, &context).await?;

    order.map(Json).ok_or(AppError::OrderNotFound(order_uid))
}

// =========================================================================
// GET /health
// =========================================================================

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
