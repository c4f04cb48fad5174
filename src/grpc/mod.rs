//! gRPC adapter.
//!
//! # Responsibilities
//! - Host the query and metrics-query services over tonic
//! - Expose `grpc.health.v1.Health` and server reflection
//! - Apply the tenancy/bearer interceptor to the query services
//!
//! # Design Decisions
//! - All services are merged into one `axum::Router` so the connection layer
//!   serves gRPC and HTTP the same way
//! - Reflection lists the application services and health, not itself

use std::sync::Arc;

use tonic::server::NamedService;
use tonic::service::Routes;
use tonic_health::server::HealthReporter;
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::Level;

use crate::query::{MetricsReader, QueryService};

pub mod convert;
pub mod interceptor;
pub mod metrics;
pub mod service;

pub use interceptor::RequestInterceptor;

/// Generated protobuf types and service stubs.
pub mod proto {
    pub mod api_v2 {
        tonic::include_proto!("spanquery.api_v2");
    }

    pub mod metrics {
        tonic::include_proto!("spanquery.api_v2.metrics");
    }

    /// Encoded descriptors of every proto above, for reflection.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("spanquery_descriptor");
}

use proto::api_v2::query_service_server::QueryServiceServer;
use proto::metrics::metrics_query_service_server::MetricsQueryServiceServer;

/// Fully-qualified name of the query service.
pub const QUERY_SERVICE_NAME: &str = <QueryServiceServer<service::QueryHandler> as NamedService>::NAME;

/// Fully-qualified name of the metrics-query service.
pub const METRICS_QUERY_SERVICE_NAME: &str =
    <MetricsQueryServiceServer<metrics::MetricsHandler> as NamedService>::NAME;

/// Build the gRPC router and the reporter driving its health service.
pub fn build_router(
    query: Arc<dyn QueryService>,
    metrics_reader: Option<Arc<dyn MetricsReader>>,
    interceptor: RequestInterceptor,
) -> Result<(axum::Router, HealthReporter), tonic_reflection::server::Error> {
    let (health_reporter, health_service) = tonic_health::server::health_reporter();

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
        .register_encoded_file_descriptor_set(tonic_health::pb::FILE_DESCRIPTOR_SET)
        .include_reflection_service(false)
        .build_v1()?;

    let query = QueryServiceServer::with_interceptor(service::QueryHandler::new(query), interceptor.clone());
    let metrics = MetricsQueryServiceServer::with_interceptor(
        metrics::MetricsHandler::new(metrics_reader),
        interceptor,
    );

    let router = Routes::new(query)
        .add_service(metrics)
        .add_service(health_service)
        .add_service(reflection)
        .into_axum_router()
        .layer(TraceLayer::new_for_grpc().on_failure(DefaultOnFailure::new().level(Level::WARN)));

    Ok((router, health_reporter))
}
