//! Per-connection dispatch and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Pick the protocol adapter for a connection (directly, or via [`mux`])
//! - Terminate TLS when the chosen protocol requires it
//! - Serve the connection with hyper and drain it gracefully on shutdown

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulConnection;
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::instrument::WithSubscriber;

use crate::lifecycle::shutdown::wait_for_shutdown;
use crate::net::mux::{self, Classification, MuxError};
use crate::net::Protocol;
use crate::observability::metrics;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Spawns hyper's background futures (HTTP/2 streams, upgrades) under the
/// dispatch of the connection that created them.
#[derive(Debug, Clone, Copy, Default)]
struct TracedExecutor;

impl<F> hyper::rt::Executor<F> for TracedExecutor
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, fut: F) {
        tokio::spawn(fut.with_current_subscriber());
    }
}

/// Counts live connections across all listeners of a server.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// Reasons a connection ended without being served cleanly.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Detect(#[from] MuxError),

    #[error("unrecognized protocol")]
    Unrecognized,

    #[error("plaintext {0} is not accepted on this port")]
    PlaintextRejected(Protocol),

    #[error("TLS is not configured on this port")]
    UnexpectedTls,

    #[error("{protocol} TLS handshake timed out")]
    HandshakeTimeout { protocol: Protocol },

    #[error("{protocol} TLS handshake failed: {source}")]
    Handshake {
        protocol: Protocol,
        #[source]
        source: std::io::Error,
    },

    #[error("{protocol} connection error: {source}")]
    Serve {
        protocol: Protocol,
        #[source]
        source: BoxError,
    },

    #[error("server shutting down before the protocol was negotiated")]
    ShuttingDown,
}

impl ConnectionError {
    fn rejection_reason(&self) -> Option<&'static str> {
        match self {
            ConnectionError::Detect(MuxError::Timeout) => Some("detect_timeout"),
            ConnectionError::Detect(_) => Some("closed_early"),
            ConnectionError::Unrecognized => Some("unrecognized"),
            ConnectionError::PlaintextRejected(_) => Some("plaintext_rejected"),
            ConnectionError::UnexpectedTls => Some("unexpected_tls"),
            _ => None,
        }
    }
}

/// A connection whose protocol is settled.
enum Negotiated {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// The routers each protocol is served with.
#[derive(Clone, Debug)]
pub struct Adapters {
    pub grpc: Router,
    pub http: Router,
}

/// How a listener maps connections to adapters.
#[derive(Clone)]
pub enum Route {
    /// Every connection is `protocol`, optionally behind TLS.
    Dedicated {
        protocol: Protocol,
        tls: Option<TlsAcceptor>,
    },

    /// Connections are classified by their first bytes.
    Shared {
        grpc_tls: Option<TlsAcceptor>,
        http_tls: Option<TlsAcceptor>,
    },
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Dedicated { protocol, tls } => f
                .debug_struct("Dedicated")
                .field("protocol", protocol)
                .field("tls", &tls.is_some())
                .finish(),
            Route::Shared { grpc_tls, http_tls } => f
                .debug_struct("Shared")
                .field("grpc_tls", &grpc_tls.is_some())
                .field("http_tls", &http_tls.is_some())
                .finish(),
        }
    }
}

/// Serves accepted connections for one listener.
#[derive(Debug)]
pub struct ConnectionRouter {
    route: Route,
    adapters: Adapters,
    handshake_timeout: Duration,
    tracker: ConnectionTracker,
}

impl ConnectionRouter {
    pub fn new(route: Route, adapters: Adapters, handshake_timeout: Duration, tracker: ConnectionTracker) -> Self {
        Self {
            route,
            adapters,
            handshake_timeout,
            tracker,
        }
    }

    /// Serve one connection to completion. Failures are logged at debug
    /// level; a misbehaving client never takes the listener down.
    pub async fn handle(&self, stream: TcpStream, peer: SocketAddr, shutdown: watch::Receiver<bool>) {
        let guard = self.tracker.track();
        let _ = stream.set_nodelay(true);

        match self.dispatch(stream, shutdown).await {
            Ok(protocol) => {
                tracing::trace!(connection_id = %guard.id(), peer_addr = %peer, %protocol, "Connection finished");
            }
            Err(ConnectionError::ShuttingDown) => {
                tracing::trace!(connection_id = %guard.id(), peer_addr = %peer, "Connection dropped during shutdown");
            }
            Err(e) => {
                if let Some(reason) = e.rejection_reason() {
                    metrics::record_connection_rejected(reason);
                }
                tracing::debug!(connection_id = %guard.id(), peer_addr = %peer, error = %e, "Connection ended with error");
            }
        }
    }

    async fn dispatch(&self, stream: TcpStream, shutdown: watch::Receiver<bool>) -> Result<Protocol, ConnectionError> {
        // Detection and the handshake give up as soon as shutdown fires.
        let mut cancel = shutdown.clone();
        let (protocol, stream) = tokio::select! {
            negotiated = self.negotiate(stream) => negotiated?,
            _ = wait_for_shutdown(&mut cancel) => return Err(ConnectionError::ShuttingDown),
        };

        match stream {
            Negotiated::Plain(stream) => self.serve(protocol, stream, shutdown).await?,
            Negotiated::Tls(stream) => self.serve(protocol, stream, shutdown).await?,
        }

        Ok(protocol)
    }

    /// Pick the protocol and terminate TLS if it applies.
    async fn negotiate(&self, stream: TcpStream) -> Result<(Protocol, Negotiated), ConnectionError> {
        let (protocol, tls) = match &self.route {
            Route::Dedicated { protocol, tls } => (*protocol, tls.clone()),
            Route::Shared { grpc_tls, http_tls } => {
                match mux::detect(&stream, self.handshake_timeout).await? {
                    Classification::Tls => match (grpc_tls, http_tls) {
                        (Some(acceptor), _) => (Protocol::Grpc, Some(acceptor.clone())),
                        (None, Some(acceptor)) => (Protocol::Http, Some(acceptor.clone())),
                        (None, None) => return Err(ConnectionError::UnexpectedTls),
                    },
                    Classification::Grpc if grpc_tls.is_none() => (Protocol::Grpc, None),
                    Classification::Http if http_tls.is_none() => (Protocol::Http, None),
                    Classification::Grpc => return Err(ConnectionError::PlaintextRejected(Protocol::Grpc)),
                    Classification::Http => return Err(ConnectionError::PlaintextRejected(Protocol::Http)),
                    Classification::Unknown | Classification::NeedMore => {
                        return Err(ConnectionError::Unrecognized)
                    }
                }
            }
        };

        metrics::record_connection(protocol);

        let Some(acceptor) = tls else {
            return Ok((protocol, Negotiated::Plain(stream)));
        };

        match tokio::time::timeout(self.handshake_timeout, acceptor.accept(stream)).await {
            Ok(Ok(stream)) => Ok((protocol, Negotiated::Tls(Box::new(stream)))),
            Ok(Err(source)) => {
                metrics::record_handshake_failure(protocol);
                Err(ConnectionError::Handshake { protocol, source })
            }
            Err(_) => {
                metrics::record_handshake_failure(protocol);
                Err(ConnectionError::HandshakeTimeout { protocol })
            }
        }
    }

    async fn serve<S>(&self, protocol: Protocol, stream: S, shutdown: watch::Receiver<bool>) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = TokioIo::new(stream);
        let result = match protocol {
            Protocol::Grpc => {
                let service = TowerToHyperService::new(self.adapters.grpc.clone());
                let conn = hyper::server::conn::http2::Builder::new(TracedExecutor)
                    .timer(TokioTimer::new())
                    .serve_connection(io, service);
                drive(conn, shutdown).await
            }
            Protocol::Http => {
                let service = TowerToHyperService::new(self.adapters.http.clone());
                let mut builder = auto::Builder::new(TracedExecutor);
                builder.http1().timer(TokioTimer::new());
                builder.http2().timer(TokioTimer::new());
                let conn = builder.serve_connection_with_upgrades(io, service);
                drive(conn, shutdown).await
            }
        };

        result.map_err(|source| ConnectionError::Serve { protocol, source })
    }
}

/// Poll `conn` until it completes, switching to a graceful drain once
/// shutdown is signalled.
async fn drive<C>(conn: C, mut shutdown: watch::Receiver<bool>) -> Result<(), BoxError>
where
    C: GracefulConnection,
    C::Error: Into<BoxError>,
{
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => return result.map_err(Into::into),
        _ = wait_for_shutdown(&mut shutdown) => {}
    }

    conn.as_mut().graceful_shutdown();
    conn.await.map_err(Into::into)
}
