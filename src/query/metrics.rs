//! Aggregated span metrics (latency, call and error rates) reader seam.

use async_trait::async_trait;

use crate::query::{QueryError, RequestContext};

/// Common parameters of every metrics query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricsQuery {
    pub service_names: Vec<String>,
    pub group_by_operation: bool,
    pub end_time: i64,
    pub lookback: i64,
    pub step: i64,
    pub rate_per: i64,
    pub span_kinds: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub timestamp: i64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub labels: Vec<(String, String)>,
    pub points: Vec<MetricPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub metrics: Vec<Metric>,
}

/// Backend for the metrics-query RPC service.
#[async_trait]
pub trait MetricsReader: Send + Sync + 'static {
    async fn get_latencies(
        &self,
        ctx: &RequestContext,
        query: &MetricsQuery,
        quantile: f64,
    ) -> Result<MetricFamily, QueryError>;

    async fn get_call_rates(&self, ctx: &RequestContext, query: &MetricsQuery) -> Result<MetricFamily, QueryError>;

    async fn get_error_rates(&self, ctx: &RequestContext, query: &MetricsQuery) -> Result<MetricFamily, QueryError>;

    /// Smallest step, in microseconds, the reader can resolve.
    async fn get_min_step_duration(&self, ctx: &RequestContext) -> Result<i64, QueryError>;
}
