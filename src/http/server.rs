//! HTTP router setup.
//!
//! # Responsibilities
//! - Create the Axum Router with all `/api` handlers
//! - Wire up middleware (tracing, timeout, request ID, tenancy, bearer tokens)
//!
//! Middleware order, outermost first: trace, request ID, timeout, tenancy
//! gate, bearer propagation, handler.

use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, middleware, routing::get, Router};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::{DefaultOnFailure, TraceLayer},
};
use tracing::Level;

use crate::http::handlers::{self, HttpState};
use crate::http::middleware::{bearer_token_propagation, tenancy_gate};
use crate::http::request::{UuidRequestId, X_REQUEST_ID};
use crate::http::response::ApiError;
use crate::query::QueryService;
use crate::tenancy::TenancyManager;

/// Build the HTTP router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(
    query: Arc<dyn QueryService>,
    tenancy: Arc<TenancyManager>,
    bearer_token_propagation_enabled: bool,
    request_timeout: Duration,
) -> Router {
    let mut router = Router::new()
        .route("/api/services", get(handlers::get_services))
        .route("/api/services/{service}/operations", get(handlers::get_service_operations))
        .route("/api/operations", get(handlers::get_operations))
        .route("/api/traces", get(handlers::find_traces))
        .route("/api/traces/{trace_id}", get(handlers::get_trace))
        .route("/api/dependencies", get(handlers::get_dependencies))
        .fallback(not_found)
        .with_state(HttpState { query });

    if bearer_token_propagation_enabled {
        router = router.layer(middleware::from_fn(bearer_token_propagation));
    }

    router
        .layer(middleware::from_fn_with_state(tenancy, tenancy_gate))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
        .layer(TraceLayer::new_for_http().on_failure(DefaultOnFailure::new().level(Level::WARN)))
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "route not found")
}
