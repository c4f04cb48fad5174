//! `/api` route handlers.

use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};

use crate::http::params::{self, QueryParams};
use crate::http::response::{list, ApiError, ApiResponse};
use crate::query::{now_micros, DependencyLink, Operation, QueryService, RequestContext, Trace};

/// State shared by all handlers.
#[derive(Clone)]
pub struct HttpState {
    pub query: Arc<dyn QueryService>,
}

pub async fn get_services(
    State(state): State<HttpState>,
    ctx: RequestContext,
) -> Result<ApiResponse<Vec<String>>, ApiError> {
    let services = state.query.get_services(&ctx).await?;
    Ok(list(services))
}

/// Legacy form returning operation names only.
pub async fn get_service_operations(
    State(state): State<HttpState>,
    ctx: RequestContext,
    Path(service): Path<String>,
) -> Result<ApiResponse<Vec<String>>, ApiError> {
    let operations = state.query.get_operations(&ctx, &service, None).await?;
    Ok(list(operations.into_iter().map(|op| op.name).collect()))
}

pub async fn get_operations(
    State(state): State<HttpState>,
    ctx: RequestContext,
    RawQuery(raw): RawQuery,
) -> Result<ApiResponse<Vec<Operation>>, ApiError> {
    let params = QueryParams::parse(raw.as_deref());
    let service = params
        .get("service")
        .ok_or_else(|| ApiError::bad_request("parameter 'service' is required"))?;
    let operations = state
        .query
        .get_operations(&ctx, service, params.get("spanKind"))
        .await?;
    Ok(list(operations))
}

/// Search traces, or fetch the traces named by `traceID` parameters.
pub async fn find_traces(
    State(state): State<HttpState>,
    ctx: RequestContext,
    RawQuery(raw): RawQuery,
) -> Result<ApiResponse<Vec<Trace>>, ApiError> {
    let params = QueryParams::parse(raw.as_deref());

    let ids = params::trace_ids(&params)?;
    if !ids.is_empty() {
        let mut traces = Vec::with_capacity(ids.len());
        for id in &ids {
            traces.push(state.query.get_trace(&ctx, id).await?);
        }
        return Ok(list(traces));
    }

    let query = params::trace_query(&params, now_micros())?;
    let traces = state.query.find_traces(&ctx, &query).await?;
    Ok(list(traces))
}

pub async fn get_trace(
    State(state): State<HttpState>,
    ctx: RequestContext,
    Path(trace_id): Path<String>,
) -> Result<ApiResponse<Vec<Trace>>, ApiError> {
    let trace_id = params::trace_id(&trace_id)?;
    let trace = state.query.get_trace(&ctx, &trace_id).await?;
    Ok(list(vec![trace]))
}

pub async fn get_dependencies(
    State(state): State<HttpState>,
    ctx: RequestContext,
    RawQuery(raw): RawQuery,
) -> Result<ApiResponse<Vec<DependencyLink>>, ApiError> {
    let params = QueryParams::parse(raw.as_deref());
    let (end_ts, lookback) = params::dependencies_window(&params, now_micros())?;
    let links = state.query.get_dependencies(&ctx, end_ts, lookback).await?;
    Ok(list(links))
}
