//! Tenancy gate middleware.
//! Rejects requests without a tenant header when tenancy is enforced.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::response::ApiError;
use crate::net::Protocol;
use crate::observability::metrics;
use crate::tenancy::TenancyManager;

pub async fn tenancy_gate(
    State(tenancy): State<Arc<TenancyManager>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    // Passthrough when tenancy is off.
    if !tenancy.enabled() {
        return next.run(req).await;
    }

    let value = req
        .headers()
        .get(tenancy.header())
        .and_then(|v| v.to_str().ok());

    match tenancy.check(value) {
        Ok(Some(tenant)) => {
            req.extensions_mut().insert(tenant);
            next.run(req).await
        }
        Ok(None) => next.run(req).await,
        Err(e) => {
            metrics::record_tenancy_rejection(Protocol::Http);
            ApiError::from(e).into_response()
        }
    }
}
