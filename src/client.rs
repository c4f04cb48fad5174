//! gRPC client for the query service.
//!
//! Used by the command-line tool and the integration tests; the server
//! itself never dials out.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use crate::config::ClientTlsOptions;
use crate::grpc::proto::api_v2::query_service_client::QueryServiceClient;
use crate::grpc::proto::metrics::metrics_query_service_client::MetricsQueryServiceClient;
use crate::net::tls::{self, TlsError};
use crate::net::Protocol;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),
}

/// A connected query-service client.
///
/// Dereferences to the generated [`QueryServiceClient`]; [`channel`] gives
/// access to the underlying connection for other services on the same
/// server (health, reflection, metrics).
///
/// [`channel`]: QueryClient::channel
#[derive(Debug, Clone)]
pub struct QueryClient {
    channel: Channel,
    inner: QueryServiceClient<Channel>,
}

impl QueryClient {
    /// Connect to `addr` (`host:port`), over TLS when `tls` is given and
    /// enabled.
    pub async fn connect(addr: &str, tls: Option<&ClientTlsOptions>) -> Result<Self, ClientError> {
        let endpoint = Endpoint::from_shared(format!("http://{addr}"))?;

        let channel = match tls.filter(|options| options.enabled) {
            None => endpoint.connect().await?,
            Some(options) => {
                let mut config = tls::client_config(options)?;
                config.alpn_protocols = Protocol::Grpc.alpn();
                let connector = TlsConnector::from(Arc::new(config));

                let host = addr.rsplit_once(':').map_or(addr, |(host, _)| host);
                let server_name = options
                    .resolve_server_name(host)
                    .map_err(|_| ClientError::InvalidServerName(host.to_string()))?;

                let target = addr.to_string();
                endpoint
                    .connect_with_connector(service_fn(move |_: Uri| {
                        let connector = connector.clone();
                        let server_name = server_name.clone();
                        let target = target.clone();
                        async move {
                            let tcp = TcpStream::connect(target).await?;
                            let stream = connector.connect(server_name, tcp).await?;
                            Ok::<_, std::io::Error>(TokioIo::new(stream))
                        }
                    }))
                    .await?
            }
        };

        Ok(Self {
            inner: QueryServiceClient::new(channel.clone()),
            channel,
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// Client for the metrics-query service on the same connection.
    pub fn metrics(&self) -> MetricsQueryServiceClient<Channel> {
        MetricsQueryServiceClient::new(self.channel.clone())
    }
}

impl Deref for QueryClient {
    type Target = QueryServiceClient<Channel>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for QueryClient {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
