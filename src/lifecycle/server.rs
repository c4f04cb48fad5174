//! Query server lifecycle.
//!
//! # Responsibilities
//! - Validate addresses, load TLS material and resolve the port topology
//! - Build the gRPC and HTTP adapters once, at construction
//! - Bind every listener in one pass and spawn one accept loop per socket
//! - Stop accept loops, drain connections and join every task on close
//!
//! # Design Decisions
//! - `new` never touches the network; all sockets are opened by `start`
//! - A failed bind drops whatever this `start` call already bound
//! - `close` is one-shot and reports task failures to the caller instead of
//!   logging them

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tonic_health::server::HealthReporter;

use crate::config::{validate_config, HostPort, ServerConfig};
use crate::error::ServerError;
use crate::grpc::{self, RequestInterceptor, METRICS_QUERY_SERVICE_NAME, QUERY_SERVICE_NAME};
use crate::health::{reporter, HealthCheck, HealthStatus};
use crate::http;
use crate::lifecycle::shutdown::Shutdown;
use crate::net::connection::{Adapters, ConnectionRouter, ConnectionTracker, Route};
use crate::net::listener::{Listener, ListenerError};
use crate::net::topology::Topology;
use crate::net::{tls, Protocol};
use crate::observability::Tracer;
use crate::query::{MetricsReader, QueryService};
use crate::tenancy::TenancyManager;

/// Collaborators handed to [`Server::new`].
#[derive(Clone)]
pub struct ServerDeps {
    pub query: Arc<dyn QueryService>,
    pub metrics_reader: Option<Arc<dyn MetricsReader>>,
    pub health: HealthCheck,
    pub tracer: Tracer,
}

impl ServerDeps {
    /// Dependencies with a fresh health sink, no metrics reader and the
    /// caller's current tracing dispatch.
    pub fn new(query: Arc<dyn QueryService>) -> Self {
        Self {
            query,
            metrics_reader: None,
            health: HealthCheck::new(),
            tracer: Tracer::current(),
        }
    }

    pub fn with_metrics_reader(mut self, reader: Arc<dyn MetricsReader>) -> Self {
        self.metrics_reader = Some(reader);
        self
    }

    pub fn with_health(mut self, health: HealthCheck) -> Self {
        self.health = health;
        self
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }
}

struct Running {
    shutdown: Shutdown,
    tasks: JoinSet<()>,
}

/// Listeners opened by one `start` call.
struct Bound {
    listeners: Vec<(Listener, Route)>,
    grpc_addr: SocketAddr,
    http_addr: SocketAddr,
}

enum State {
    Idle,
    Running(Running),
    Closed,
}

/// Serves the query API over gRPC and HTTP.
pub struct Server {
    config: ServerConfig,
    topology: Topology,
    adapters: Adapters,
    health: HealthCheck,
    health_reporter: HealthReporter,
    tracer: Tracer,
    tracker: ConnectionTracker,
    grpc_addr: OnceLock<SocketAddr>,
    http_addr: OnceLock<SocketAddr>,
    state: Mutex<State>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("topology", &self.topology)
            .field("grpc_addr", &self.grpc_addr.get())
            .field("http_addr", &self.http_addr.get())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Validate `config` and wire both adapters. No socket is opened.
    pub fn new(config: ServerConfig, deps: ServerDeps) -> Result<Self, ServerError> {
        let addrs = validate_config(&config)?;

        let grpc_tls = tls::server_config(Protocol::Grpc, &config.tls_grpc)?;
        let http_tls = tls::server_config(Protocol::Http, &config.tls_http)?;
        let topology = Topology::resolve(&addrs, grpc_tls, http_tls)?;

        let tenancy = Arc::new(TenancyManager::new(&config.tenancy));
        let interceptor = RequestInterceptor::new(Arc::clone(&tenancy), config.bearer_token_propagation);

        let (grpc_router, health_reporter) =
            grpc::build_router(Arc::clone(&deps.query), deps.metrics_reader, interceptor)?;
        let http_router = http::build_router(
            deps.query,
            tenancy,
            config.bearer_token_propagation,
            Duration::from_secs(config.request_timeout_secs),
        );

        Ok(Self {
            config,
            topology,
            adapters: Adapters {
                grpc: grpc_router,
                http: http_router,
            },
            health: deps.health,
            health_reporter,
            tracer: deps.tracer,
            tracker: ConnectionTracker::new(),
            grpc_addr: OnceLock::new(),
            http_addr: OnceLock::new(),
            state: Mutex::new(State::Idle),
        })
    }

    /// Bind every listener and start serving. Returns once the sockets are
    /// accepting; serving continues in background tasks until [`close`].
    ///
    /// [`close`]: Server::close
    pub async fn start(&self) -> Result<(), ServerError> {
        self.tracer.instrument(self.start_inner()).await
    }

    async fn start_inner(&self) -> Result<(), ServerError> {
        let mut state = self.state.lock().await;
        match *state {
            State::Idle => {}
            State::Running(_) => return Err(ServerError::AlreadyStarted),
            State::Closed => return Err(ServerError::Closed),
        }

        let Bound {
            listeners,
            grpc_addr,
            http_addr,
        } = self.bind().await?;
        let _ = self.grpc_addr.set(grpc_addr);
        let _ = self.http_addr.set(http_addr);

        let shutdown = Shutdown::new();
        let mut tasks = JoinSet::new();
        let handshake_timeout = Duration::from_millis(self.config.mux_timeout_ms);
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);

        for (listener, route) in listeners {
            let router = Arc::new(ConnectionRouter::new(
                route,
                self.adapters.clone(),
                handshake_timeout,
                self.tracker.clone(),
            ));
            tasks.spawn(self.tracer.instrument(listener.run(router, shutdown.subscribe(), grace)));
        }

        tasks.spawn(self.tracer.instrument(reporter::forward(
            self.health.clone(),
            self.health_reporter.clone(),
            vec![QUERY_SERVICE_NAME, METRICS_QUERY_SERVICE_NAME],
            shutdown.subscribe(),
        )));

        self.health.set(HealthStatus::Ready);
        *state = State::Running(Running { shutdown, tasks });

        tracing::info!(
            port = http_addr.port(),
            grpc_port = grpc_addr.port(),
            http_port = http_addr.port(),
            grpc_addr = %grpc_addr,
            http_addr = %http_addr,
            shared = self.topology.is_shared(),
            "Query server started"
        );
        Ok(())
    }

    /// Bind the sockets the topology asks for. Listeners bound before a
    /// failure are dropped on return.
    async fn bind(&self) -> Result<Bound, ServerError> {
        let max_connections = self.config.max_connections;

        match &self.topology {
            Topology::Separate { grpc, http } => {
                let grpc_listener = bind_listener(grpc.protocol.as_str(), &grpc.addr, max_connections).await?;
                let http_listener = bind_listener(http.protocol.as_str(), &http.addr, max_connections).await?;
                let grpc_addr = local_addr(&grpc_listener, grpc.protocol.as_str(), &grpc.addr)?;
                let http_addr = local_addr(&http_listener, http.protocol.as_str(), &http.addr)?;

                let grpc_route = Route::Dedicated {
                    protocol: Protocol::Grpc,
                    tls: grpc.tls.clone().map(TlsAcceptor::from),
                };
                let http_route = Route::Dedicated {
                    protocol: Protocol::Http,
                    tls: http.tls.clone().map(TlsAcceptor::from),
                };

                Ok(Bound {
                    listeners: vec![(grpc_listener, grpc_route), (http_listener, http_route)],
                    grpc_addr,
                    http_addr,
                })
            }
            Topology::Shared {
                addr,
                grpc_tls,
                http_tls,
            } => {
                let listener = bind_listener("shared", addr, max_connections).await?;
                let bound_addr = local_addr(&listener, "shared", addr)?;
                let route = Route::Shared {
                    grpc_tls: grpc_tls.clone().map(TlsAcceptor::from),
                    http_tls: http_tls.clone().map(TlsAcceptor::from),
                };

                Ok(Bound {
                    listeners: vec![(listener, route)],
                    grpc_addr: bound_addr,
                    http_addr: bound_addr,
                })
            }
        }
    }

    /// Stop serving: flip health to unavailable, stop every accept loop,
    /// drain connections within the grace period and join all tasks.
    ///
    /// Safe to call before `start`, after a failed `start`, or twice.
    /// Returns the first task failure.
    pub async fn close(&self) -> Result<(), ServerError> {
        self.tracer.instrument(self.close_inner()).await
    }

    async fn close_inner(&self) -> Result<(), ServerError> {
        let mut state = self.state.lock().await;
        self.health.set(HealthStatus::Unavailable);

        let Running { shutdown, mut tasks } = match std::mem::replace(&mut *state, State::Closed) {
            State::Running(running) => running,
            State::Idle | State::Closed => return Ok(()),
        };

        shutdown.trigger();

        let mut first_error = None;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::debug!(error = %e, "Server task failed");
                first_error.get_or_insert(e);
            }
        }

        tracing::info!(active_connections = self.tracker.active_count(), "Query server stopped");
        first_error.map_or(Ok(()), |e| Err(ServerError::Task(e)))
    }

    /// Bound gRPC address, once started.
    pub fn grpc_addr(&self) -> Option<SocketAddr> {
        self.grpc_addr.get().copied()
    }

    /// Bound HTTP address, once started. Equal to [`grpc_addr`] on a shared
    /// port.
    ///
    /// [`grpc_addr`]: Server::grpc_addr
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr.get().copied()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn health(&self) -> &HealthCheck {
        &self.health
    }

    /// Connections currently being served across all listeners.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }
}

async fn bind_listener(endpoint: &'static str, addr: &HostPort, max_connections: usize) -> Result<Listener, ServerError> {
    Listener::bind(endpoint, addr, max_connections)
        .await
        .map_err(|e| bind_error(endpoint, addr, e))
}

fn local_addr(listener: &Listener, endpoint: &'static str, addr: &HostPort) -> Result<SocketAddr, ServerError> {
    listener
        .local_addr()
        .map_err(|e| bind_error(endpoint, addr, ListenerError::Bind(e)))
}

fn bind_error(endpoint: &'static str, addr: &HostPort, error: ListenerError) -> ServerError {
    let source = match error {
        ListenerError::Bind(source) | ListenerError::Accept(source) => source,
        other => std::io::Error::other(other.to_string()),
    };
    ServerError::Bind {
        endpoint,
        addr: addr.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsOptions;
    use crate::query::MemoryQueryService;

    fn deps() -> ServerDeps {
        ServerDeps::new(Arc::new(MemoryQueryService::new())).with_tracer(Tracer::noop())
    }

    fn ephemeral() -> ServerConfig {
        ServerConfig {
            grpc_host_port: "127.0.0.1:0".into(),
            http_host_port: "127.0.0.1:0".into(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn malformed_address_fails_construction() {
        let config = ServerConfig {
            grpc_host_port: "8080".into(),
            ..ephemeral()
        };
        let err = Server::new(config, deps()).unwrap_err();
        assert!(err.to_string().contains("grpc"), "{err}");
    }

    #[test]
    fn missing_tls_material_fails_construction() {
        let config = ServerConfig {
            tls_http: TlsOptions::server("/nonexistent/cert.pem", "/nonexistent/key.pem"),
            ..ephemeral()
        };
        assert!(matches!(Server::new(config, deps()), Err(ServerError::Tls(_))));
    }

    #[tokio::test]
    async fn start_close_lifecycle() {
        let health = HealthCheck::new();
        let server = Server::new(ephemeral(), deps().with_health(health.clone())).unwrap();
        assert_eq!(server.grpc_addr(), None);

        server.start().await.unwrap();
        assert_eq!(health.get(), HealthStatus::Ready);
        let grpc = server.grpc_addr().unwrap();
        let http = server.http_addr().unwrap();
        assert_ne!(grpc.port(), 0);
        assert_ne!(http.port(), 0);
        assert_ne!(grpc, http);

        assert!(matches!(server.start().await, Err(ServerError::AlreadyStarted)));

        server.close().await.unwrap();
        assert_eq!(health.get(), HealthStatus::Unavailable);
        assert!(tokio::net::TcpStream::connect(http).await.is_err());

        server.close().await.unwrap();
        assert!(matches!(server.start().await, Err(ServerError::Closed)));
    }

    #[tokio::test]
    async fn close_without_start_is_ok() {
        let server = Server::new(ephemeral(), deps()).unwrap();
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn failed_bind_releases_earlier_listeners() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken_addr = taken.local_addr().unwrap();

        // Reserve a free port for gRPC, then release it for the server to use.
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let grpc_addr = probe.local_addr().unwrap();
        drop(probe);

        let config = ServerConfig {
            grpc_host_port: grpc_addr.to_string(),
            http_host_port: taken_addr.to_string(),
            ..ServerConfig::default()
        };
        let server = Server::new(config, deps()).unwrap();

        match server.start().await {
            Err(ServerError::Bind { endpoint, .. }) => assert_eq!(endpoint, "http"),
            other => panic!("expected bind error, got {other:?}"),
        }
        assert!(std::net::TcpListener::bind(grpc_addr).is_ok());
        server.close().await.unwrap();
    }
}
