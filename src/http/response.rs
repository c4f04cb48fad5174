//! JSON response envelope and error mapping.
//!
//! # Responsibilities
//! - Wrap every payload in `{data, total, limit, offset, errors}`
//! - Map query and parameter errors to HTTP status codes
//!
//! # Design Decisions
//! - Errors use the same envelope with `data: null`
//! - Server-side failures are logged at warn, client mistakes at debug

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::query::QueryError;
use crate::tenancy::TenancyError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub errors: Option<Vec<ErrorBody>>,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T, total: usize) -> Self {
        Self {
            data,
            total,
            limit: 0,
            offset: 0,
            errors: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Envelope for a list payload.
pub fn list<T: Serialize>(items: Vec<T>) -> ApiResponse<Vec<T>> {
    let total = items.len();
    ApiResponse::new(items, total)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: u16,
    pub msg: String,
}

/// An error returned from an HTTP handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub msg: String,
}

impl ApiError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        let status = match &err {
            QueryError::NotFound(_) => StatusCode::NOT_FOUND,
            QueryError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            QueryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.to_string())
    }
}

impl From<TenancyError> for ApiError {
    fn from(err: TenancyError) -> Self {
        ApiError::new(StatusCode::UNAUTHORIZED, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(status = self.status.as_u16(), error = %self.msg, "Query failed");
        } else {
            tracing::debug!(status = self.status.as_u16(), error = %self.msg, "Request rejected");
        }

        let body = ApiResponse {
            data: (),
            total: 0,
            limit: 0,
            offset: 0,
            errors: Some(vec![ErrorBody {
                code: self.status.as_u16(),
                msg: self.msg,
            }]),
        };
        (self.status, Json(body)).into_response()
    }
}
