//! `spanquery.api_v2.QueryService` implementation.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use super::convert;
use super::interceptor::request_context;
use super::proto::api_v2::query_service_server::QueryService as QueryServiceRpc;
use super::proto::api_v2::{
    FindTracesRequest, FindTracesResponse, GetDependenciesRequest, GetDependenciesResponse,
    GetOperationsRequest, GetOperationsResponse, GetServicesRequest, GetServicesResponse,
    GetTraceRequest, GetTraceResponse,
};
use crate::query::{now_micros, QueryService};

/// Default dependency lookback when a request leaves it at zero: one day.
const DEFAULT_DEPENDENCY_LOOKBACK_MICROS: i64 = 24 * 60 * 60 * 1_000_000;

/// Forwards every RPC to a [`QueryService`].
pub struct QueryHandler {
    query: Arc<dyn QueryService>,
}

impl QueryHandler {
    pub fn new(query: Arc<dyn QueryService>) -> Self {
        Self { query }
    }
}

#[tonic::async_trait]
impl QueryServiceRpc for QueryHandler {
    async fn get_services(
        &self,
        request: Request<GetServicesRequest>,
    ) -> Result<Response<GetServicesResponse>, Status> {
        let ctx = request_context(&request);
        let services = self.query.get_services(&ctx).await?;
        Ok(Response::new(GetServicesResponse { services }))
    }

    async fn get_operations(
        &self,
        request: Request<GetOperationsRequest>,
    ) -> Result<Response<GetOperationsResponse>, Status> {
        let ctx = request_context(&request);
        let req = request.into_inner();
        if req.service.is_empty() {
            return Err(Status::invalid_argument("service is required"));
        }
        let span_kind = Some(req.span_kind.as_str()).filter(|k| !k.is_empty());

        let operations = self.query.get_operations(&ctx, &req.service, span_kind).await?;
        Ok(Response::new(GetOperationsResponse {
            operation_names: operations.iter().map(|op| op.name.clone()).collect(),
            operations: operations.into_iter().map(Into::into).collect(),
        }))
    }

    async fn find_traces(
        &self,
        request: Request<FindTracesRequest>,
    ) -> Result<Response<FindTracesResponse>, Status> {
        let ctx = request_context(&request);
        let query = convert::trace_query(request.into_inner().query)?;
        let traces = self.query.find_traces(&ctx, &query).await?;
        Ok(Response::new(FindTracesResponse {
            traces: traces.into_iter().map(Into::into).collect(),
        }))
    }

    async fn get_trace(
        &self,
        request: Request<GetTraceRequest>,
    ) -> Result<Response<GetTraceResponse>, Status> {
        let ctx = request_context(&request);
        let trace_id = request.into_inner().trace_id;
        if trace_id.is_empty() {
            return Err(Status::invalid_argument("trace id is required"));
        }
        let trace = self.query.get_trace(&ctx, &trace_id).await?;
        Ok(Response::new(GetTraceResponse {
            trace: Some(trace.into()),
        }))
    }

    async fn get_dependencies(
        &self,
        request: Request<GetDependenciesRequest>,
    ) -> Result<Response<GetDependenciesResponse>, Status> {
        let ctx = request_context(&request);
        let req = request.into_inner();
        let end_ts = if req.end_time_micros == 0 {
            now_micros()
        } else {
            req.end_time_micros
        };
        let lookback = if req.lookback_micros == 0 {
            DEFAULT_DEPENDENCY_LOOKBACK_MICROS
        } else {
            req.lookback_micros
        };

        let links = self.query.get_dependencies(&ctx, end_ts, lookback).await?;
        Ok(Response::new(GetDependenciesResponse {
            dependencies: links.into_iter().map(Into::into).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{MemoryQueryService, Process, Span, Trace};
    use tonic::Code;

    fn handler() -> (QueryHandler, Arc<MemoryQueryService>) {
        let memory = Arc::new(MemoryQueryService::with_traces([Trace {
            trace_id: "ab12".into(),
            spans: vec![Span {
                trace_id: "ab12".into(),
                span_id: "1".into(),
                parent_span_id: String::new(),
                operation_name: "GET /".into(),
                span_kind: "server".into(),
                start_time: 1_000,
                duration: 10,
                tags: Vec::new(),
                process: Process {
                    service_name: "frontend".into(),
                    tags: Vec::new(),
                },
            }],
        }]));
        (QueryHandler::new(memory.clone()), memory)
    }

    #[tokio::test]
    async fn get_operations_lists_names_and_kinds() {
        let (handler, _) = handler();
        let response = handler
            .get_operations(Request::new(GetOperationsRequest {
                service: "frontend".into(),
                span_kind: String::new(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.operation_names, vec!["GET /"]);
        assert_eq!(response.operations[0].span_kind, "server");
    }

    #[tokio::test]
    async fn get_trace_maps_not_found() {
        let (handler, _) = handler();
        let status = handler
            .get_trace(Request::new(GetTraceRequest { trace_id: "ffff".into() }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);

        let trace = handler
            .get_trace(Request::new(GetTraceRequest { trace_id: "ab12".into() }))
            .await
            .unwrap()
            .into_inner()
            .trace
            .unwrap();
        assert_eq!(trace.spans[0].service_name, "frontend");
    }

    #[tokio::test]
    async fn get_dependencies_applies_default_lookback() {
        let (handler, memory) = handler();
        handler
            .get_dependencies(Request::new(GetDependenciesRequest {
                end_time_micros: 5_000,
                lookback_micros: 0,
            }))
            .await
            .unwrap();
        let call = memory.calls().pop().unwrap();
        assert_eq!(call.arguments, format!("5000 {DEFAULT_DEPENDENCY_LOOKBACK_MICROS}"));
    }
}
