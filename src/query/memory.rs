//! In-memory query service.
//!
//! Serves a fixed set of traces and records every call it receives, so
//! tests can assert on what the adapters forwarded (tenant, bearer token,
//! parsed arguments).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::query::model::{DependencyLink, Operation, Span, Trace, TraceQueryParameters};
use crate::query::{QueryError, QueryService, RequestContext};

/// One call observed by [`MemoryQueryService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub ctx: RequestContext,
    /// Debug rendering of the call's arguments.
    pub arguments: String,
}

#[derive(Debug, Default)]
pub struct MemoryQueryService {
    traces: Vec<Trace>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MemoryQueryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_traces(traces: impl IntoIterator<Item = Trace>) -> Self {
        Self {
            traces: traces.into_iter().collect(),
            calls: Mutex::default(),
        }
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, method: &'static str, ctx: &RequestContext, arguments: String) {
        tracing::debug!(method, tenant = ?ctx.tenant, "Query received");
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                method,
                ctx: ctx.clone(),
                arguments,
            });
    }

    fn spans<T>(&self, f: impl FnOnce(&mut dyn Iterator<Item = &Span>) -> T) -> T {
        let mut spans = self.traces.iter().flat_map(|t| t.spans.iter());
        f(&mut spans)
    }
}

#[async_trait]
impl QueryService for MemoryQueryService {
    async fn get_services(&self, ctx: &RequestContext) -> Result<Vec<String>, QueryError> {
        self.record("get_services", ctx, String::new());
        Ok(self.spans(|spans| {
            spans
                .map(|s| s.service_name().to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        }))
    }

    async fn get_operations(
        &self,
        ctx: &RequestContext,
        service: &str,
        span_kind: Option<&str>,
    ) -> Result<Vec<Operation>, QueryError> {
        self.record("get_operations", ctx, format!("{service:?} {span_kind:?}"));
        if service.is_empty() {
            return Err(QueryError::InvalidArgument("service is required".into()));
        }
        Ok(self.spans(|spans| {
            spans
                .filter(|s| s.service_name() == service)
                .filter(|s| span_kind.map_or(true, |kind| s.span_kind == kind))
                .map(|s| Operation {
                    name: s.operation_name.clone(),
                    span_kind: s.span_kind.clone(),
                })
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        }))
    }

    async fn find_traces(
        &self,
        ctx: &RequestContext,
        query: &TraceQueryParameters,
    ) -> Result<Vec<Trace>, QueryError> {
        self.record("find_traces", ctx, format!("{query:?}"));
        if query.service_name.is_empty() {
            return Err(QueryError::InvalidArgument("service is required".into()));
        }

        let limit = if query.search_depth == 0 {
            usize::MAX
        } else {
            query.search_depth
        };
        Ok(self
            .traces
            .iter()
            .filter(|t| t.spans.iter().any(|s| query.matches(s)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_trace(&self, ctx: &RequestContext, trace_id: &str) -> Result<Trace, QueryError> {
        self.record("get_trace", ctx, trace_id.to_string());
        self.traces
            .iter()
            .find(|t| t.trace_id.eq_ignore_ascii_case(trace_id))
            .cloned()
            .ok_or_else(|| QueryError::NotFound(format!("trace {trace_id}")))
    }

    async fn get_dependencies(
        &self,
        ctx: &RequestContext,
        end_ts: i64,
        lookback: i64,
    ) -> Result<Vec<DependencyLink>, QueryError> {
        self.record("get_dependencies", ctx, format!("{end_ts} {lookback}"));
        if lookback < 0 {
            return Err(QueryError::InvalidArgument("lookback must not be negative".into()));
        }
        let start_ts = end_ts.saturating_sub(lookback);

        let mut counts: BTreeMap<(String, String), u64> = BTreeMap::new();
        for trace in &self.traces {
            let by_id: HashMap<&str, &Span> = trace.spans.iter().map(|s| (s.span_id.as_str(), s)).collect();
            for child in &trace.spans {
                if child.start_time < start_ts || child.start_time > end_ts {
                    continue;
                }
                let Some(parent) = by_id.get(child.parent_span_id.as_str()) else {
                    continue;
                };
                if parent.service_name() != child.service_name() {
                    *counts
                        .entry((parent.service_name().to_string(), child.service_name().to_string()))
                        .or_default() += 1;
                }
            }
        }

        Ok(counts
            .into_iter()
            .map(|((parent, child), call_count)| DependencyLink {
                parent,
                child,
                call_count,
            })
            .collect())
    }
}
