//! Conversions between query model types and protobuf types.

use tonic::Status;

use super::proto::{api_v2 as pb, metrics as metrics_pb};
use crate::query::metrics::{Metric, MetricFamily, MetricPoint, MetricsQuery};
use crate::query::{now_micros, DependencyLink, KeyValue, Operation, QueryError, Span, Trace, TraceQueryParameters};

/// Search depth applied when a request leaves it at zero.
pub const DEFAULT_SEARCH_DEPTH: usize = 100;

// =============================================================================
// Native → Proto (responses)
// =============================================================================

impl From<KeyValue> for pb::KeyValue {
    fn from(kv: KeyValue) -> Self {
        pb::KeyValue {
            key: kv.key,
            value: kv.value,
        }
    }
}

impl From<Span> for pb::Span {
    fn from(span: Span) -> Self {
        pb::Span {
            trace_id: span.trace_id,
            span_id: span.span_id,
            parent_span_id: span.parent_span_id,
            operation_name: span.operation_name,
            service_name: span.process.service_name,
            span_kind: span.span_kind,
            start_time_micros: span.start_time,
            duration_micros: span.duration,
            tags: span.tags.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Trace> for pb::Trace {
    fn from(trace: Trace) -> Self {
        pb::Trace {
            trace_id: trace.trace_id,
            spans: trace.spans.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Operation> for pb::Operation {
    fn from(op: Operation) -> Self {
        pb::Operation {
            name: op.name,
            span_kind: op.span_kind,
        }
    }
}

impl From<DependencyLink> for pb::DependencyLink {
    fn from(link: DependencyLink) -> Self {
        pb::DependencyLink {
            parent: link.parent,
            child: link.child,
            call_count: link.call_count,
        }
    }
}

impl From<MetricFamily> for metrics_pb::MetricFamily {
    fn from(family: MetricFamily) -> Self {
        metrics_pb::MetricFamily {
            name: family.name,
            help: family.help,
            metrics: family.metrics.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Metric> for metrics_pb::Metric {
    fn from(metric: Metric) -> Self {
        metrics_pb::Metric {
            labels: metric
                .labels
                .into_iter()
                .map(|(name, value)| metrics_pb::Label { name, value })
                .collect(),
            metric_points: metric
                .points
                .into_iter()
                .map(|MetricPoint { timestamp, value }| metrics_pb::MetricPoint {
                    timestamp_micros: timestamp,
                    value,
                })
                .collect(),
        }
    }
}

// =============================================================================
// Proto → Native (requests)
// =============================================================================

/// Convert a FindTraces query. A zero upper bound means "now".
pub fn trace_query(query: Option<pb::TraceQueryParameters>) -> Result<TraceQueryParameters, Status> {
    let query = query.ok_or_else(|| Status::invalid_argument("missing query parameters"))?;
    if query.service_name.is_empty() {
        return Err(Status::invalid_argument("service name is required"));
    }

    let start_time_max = if query.start_time_max_micros == 0 {
        now_micros()
    } else {
        query.start_time_max_micros
    };
    if query.start_time_min_micros > start_time_max {
        return Err(Status::invalid_argument("start time minimum is after maximum"));
    }

    let positive = |v: i64| (v > 0).then_some(v);
    let duration_min = positive(query.duration_min_micros);
    let duration_max = positive(query.duration_max_micros);
    if let (Some(min), Some(max)) = (duration_min, duration_max) {
        if min > max {
            return Err(Status::invalid_argument("minimum duration is greater than maximum"));
        }
    }

    let search_depth = usize::try_from(query.search_depth)
        .ok()
        .filter(|d| *d > 0)
        .unwrap_or(DEFAULT_SEARCH_DEPTH);

    Ok(TraceQueryParameters {
        service_name: query.service_name,
        operation_name: Some(query.operation_name).filter(|op| !op.is_empty()),
        tags: query.tags.into_iter().collect(),
        start_time_min: query.start_time_min_micros,
        start_time_max,
        duration_min,
        duration_max,
        search_depth,
    })
}

/// Convert the shared part of a metrics request.
pub fn metrics_query(base: Option<metrics_pb::MetricsQueryBaseRequest>) -> Result<MetricsQuery, Status> {
    let base = base.ok_or_else(|| Status::invalid_argument("missing base request"))?;
    if base.service_names.is_empty() {
        return Err(Status::invalid_argument("please provide at least one service name"));
    }
    Ok(MetricsQuery {
        service_names: base.service_names,
        group_by_operation: base.group_by_operation,
        end_time: if base.end_time_micros == 0 { now_micros() } else { base.end_time_micros },
        lookback: base.lookback_micros,
        step: base.step_micros,
        rate_per: base.rate_per_micros,
        span_kinds: base.span_kinds,
    })
}

impl From<QueryError> for Status {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotFound(msg) => Status::not_found(msg),
            QueryError::InvalidArgument(msg) => Status::invalid_argument(msg),
            QueryError::Unavailable(msg) => Status::unavailable(msg),
            QueryError::Internal(msg) => Status::internal(msg),
        }
    }
}
