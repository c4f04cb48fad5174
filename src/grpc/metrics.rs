//! `spanquery.api_v2.metrics.MetricsQueryService` implementation.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use super::convert;
use super::interceptor::request_context;
use super::proto::metrics::metrics_query_service_server::MetricsQueryService as MetricsQueryRpc;
use super::proto::metrics::{
    GetCallRatesRequest, GetErrorRatesRequest, GetLatenciesRequest, GetMetricsResponse,
    GetMinStepDurationRequest, GetMinStepDurationResponse,
};
use crate::query::metrics::MetricFamily;
use crate::query::MetricsReader;

const DISABLED: &str = "metrics querying is currently disabled";

/// Forwards metrics RPCs to an optional [`MetricsReader`].
pub struct MetricsHandler {
    reader: Option<Arc<dyn MetricsReader>>,
}

impl MetricsHandler {
    pub fn new(reader: Option<Arc<dyn MetricsReader>>) -> Self {
        Self { reader }
    }

    fn reader(&self) -> Result<&Arc<dyn MetricsReader>, Status> {
        self.reader.as_ref().ok_or_else(|| Status::unimplemented(DISABLED))
    }
}

fn metrics_response(family: MetricFamily) -> Response<GetMetricsResponse> {
    Response::new(GetMetricsResponse {
        metrics: Some(family.into()),
    })
}

#[tonic::async_trait]
impl MetricsQueryRpc for MetricsHandler {
    async fn get_min_step_duration(
        &self,
        request: Request<GetMinStepDurationRequest>,
    ) -> Result<Response<GetMinStepDurationResponse>, Status> {
        let reader = self.reader()?;
        let ctx = request_context(&request);
        let min_step_micros = reader.get_min_step_duration(&ctx).await?;
        Ok(Response::new(GetMinStepDurationResponse { min_step_micros }))
    }

    async fn get_latencies(
        &self,
        request: Request<GetLatenciesRequest>,
    ) -> Result<Response<GetMetricsResponse>, Status> {
        let reader = self.reader()?;
        let ctx = request_context(&request);
        let req = request.into_inner();
        if !(req.quantile > 0.0 && req.quantile <= 1.0) {
            return Err(Status::invalid_argument("quantile must be in (0, 1]"));
        }
        let query = convert::metrics_query(req.base_request)?;
        Ok(metrics_response(reader.get_latencies(&ctx, &query, req.quantile).await?))
    }

    async fn get_call_rates(
        &self,
        request: Request<GetCallRatesRequest>,
    ) -> Result<Response<GetMetricsResponse>, Status> {
        let reader = self.reader()?;
        let ctx = request_context(&request);
        let query = convert::metrics_query(request.into_inner().base_request)?;
        Ok(metrics_response(reader.get_call_rates(&ctx, &query).await?))
    }

    async fn get_error_rates(
        &self,
        request: Request<GetErrorRatesRequest>,
    ) -> Result<Response<GetMetricsResponse>, Status> {
        let reader = self.reader()?;
        let ctx = request_context(&request);
        let query = convert::metrics_query(request.into_inner().base_request)?;
        Ok(metrics_response(reader.get_error_rates(&ctx, &query).await?))
    }
}
