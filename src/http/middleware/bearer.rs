//! Bearer token propagation middleware.
//! Stores the caller's `Authorization: Bearer` token for the query service.

use axum::{
    body::Body,
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use crate::query::BearerToken;

pub async fn bearer_token_propagation(mut req: Request<Body>, next: Next) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(BearerToken::from_authorization);

    if let Some(token) = token {
        req.extensions_mut().insert(token);
    }
    next.run(req).await
}
