//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind to a configured endpoint address
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Drain connections within a grace period on shutdown

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::instrument::WithSubscriber;

use crate::config::HostPort;
use crate::lifecycle::shutdown::wait_for_shutdown;
use crate::net::connection::ConnectionRouter;

/// Back-off after a failed `accept` (e.g. descriptor exhaustion).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    Bind(#[source] std::io::Error),

    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(#[source] std::io::Error),

    /// The connection limiter was closed.
    #[error("Connection limiter closed")]
    LimiterClosed,
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
#[derive(Debug)]
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Semaphore to limit concurrent connections.
    connection_limit: Arc<Semaphore>,
    /// Configured maximum connections.
    max_connections: usize,
    /// Endpoint label for logs ("grpc", "http" or "shared").
    label: &'static str,
}

impl Listener {
    /// Bind to `addr` with connection limits.
    pub async fn bind(
        label: &'static str,
        addr: &HostPort,
        max_connections: usize,
    ) -> Result<Self, ListenerError> {
        let listener = bind_socket(addr).await.map_err(ListenerError::Bind)?;

        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            endpoint = label,
            address = %local_addr,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            label,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::LimiterClosed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            endpoint = self.label,
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Accept and serve connections until shutdown is signalled.
    ///
    /// On shutdown the listening socket is closed first, then live
    /// connections get `grace` to finish before they are aborted.
    pub async fn run(
        self,
        router: Arc<ConnectionRouter>,
        mut shutdown: watch::Receiver<bool>,
        grace: Duration,
    ) {
        let label = self.label;
        let connection_shutdown = shutdown.clone();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = self.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let router = Arc::clone(&router);
                        let shutdown = connection_shutdown.clone();
                        connections.spawn(
                            async move {
                                let _permit = permit;
                                router.handle(stream, peer, shutdown).await;
                            }
                            .with_current_subscriber(),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(endpoint = label, error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                }
            }
        }

        // Stop accepting before draining.
        drop(self);
        tracing::debug!(endpoint = label, active = connections.len(), "Listener closed, draining connections");

        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                endpoint = label,
                remaining = connections.len(),
                grace_secs = grace.as_secs_f64(),
                "Grace period elapsed, aborting connections"
            );
            connections.shutdown().await;
        }

        tracing::debug!(endpoint = label, "Accept loop stopped");
    }
}

/// Bind `addr`. A wildcard host takes the IPv6 unspecified address, which is
/// dual-stack where the OS allows it, and falls back to IPv4 when the host
/// has no IPv6 support.
async fn bind_socket(addr: &HostPort) -> io::Result<TcpListener> {
    if !addr.is_wildcard() {
        return TcpListener::bind((addr.host.as_str(), addr.port)).await;
    }

    match TcpListener::bind((Ipv6Addr::UNSPECIFIED, addr.port)).await {
        Err(e) if !matches!(e.kind(), io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied) => {
            tracing::debug!(port = addr.port, error = %e, "IPv6 wildcard unavailable, binding IPv4");
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, addr.port)).await
        }
        result => result,
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This ensures backpressure is maintained even if the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}
