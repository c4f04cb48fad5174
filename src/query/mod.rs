//! Query service seam.
//!
//! # Data Flow
//! ```text
//! gRPC handler / HTTP handler
//!     → RequestContext (tenant, bearer token)
//!     → QueryService (async trait, owned by the caller of Server::new)
//!     → model types back to the adapter for encoding
//! ```
//!
//! # Design Decisions
//! - The server never stores traces; it forwards to a `QueryService`
//! - `MemoryQueryService` is a deterministic implementation for tests and the demo binary
//! - Errors are protocol-neutral and mapped by each adapter

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;

use crate::tenancy::Tenant;

pub mod memory;
pub mod metrics;
pub mod model;

pub use memory::{MemoryQueryService, RecordedCall};
pub use metrics::{MetricsQuery, MetricsReader};
pub use model::{DependencyLink, KeyValue, Operation, Process, Span, Trace, TraceQueryParameters};

/// Current wall-clock time in unix microseconds.
pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Caller bearer token, forwarded when propagation is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

impl BearerToken {
    /// Extract the token from an `authorization: Bearer <token>` value.
    pub fn from_authorization(value: &str) -> Option<Self> {
        let (scheme, token) = value.trim().split_once(' ')?;
        let token = token.trim();
        (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| BearerToken(token.to_string()))
    }
}

/// Per-request data passed alongside every query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub tenant: Option<Tenant>,
    pub bearer_token: Option<BearerToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("query backend unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Trace query operations served by both protocol adapters.
#[async_trait]
pub trait QueryService: Send + Sync + 'static {
    async fn get_services(&self, ctx: &RequestContext) -> Result<Vec<String>, QueryError>;

    /// Operations of `service`, optionally restricted to one span kind.
    async fn get_operations(
        &self,
        ctx: &RequestContext,
        service: &str,
        span_kind: Option<&str>,
    ) -> Result<Vec<Operation>, QueryError>;

    async fn find_traces(
        &self,
        ctx: &RequestContext,
        query: &TraceQueryParameters,
    ) -> Result<Vec<Trace>, QueryError>;

    async fn get_trace(&self, ctx: &RequestContext, trace_id: &str) -> Result<Trace, QueryError>;

    /// Service-to-service call counts in `[end_ts - lookback, end_ts]`.
    async fn get_dependencies(
        &self,
        ctx: &RequestContext,
        end_ts: i64,
        lookback: i64,
    ) -> Result<Vec<DependencyLink>, QueryError>;
}
