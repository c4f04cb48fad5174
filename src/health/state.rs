//! Process health state.
//!
//! # States
//! - Unavailable: not serving (before start, after close)
//! - Ready: listeners bound and accepting
//! - Broken: unrecoverable failure reported by a collaborator
//!
//! # State Transitions
//! ```text
//! Unavailable → Ready: Server::start succeeded
//! Ready → Unavailable: Server::close
//! any → Broken: set by the owner
//! ```

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Unavailable,
    Ready,
    Broken,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unavailable => "unavailable",
            HealthStatus::Ready => "ready",
            HealthStatus::Broken => "broken",
        }
    }
}

/// Settable health sink shared between the server and its observers.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    tx: Arc<watch::Sender<HealthStatus>>,
}

impl HealthCheck {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(HealthStatus::Unavailable);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, status: HealthStatus) {
        let previous = self.tx.send_replace(status);
        if previous != status {
            tracing::info!(from = previous.as_str(), to = status.as_str(), "Health status changed");
        }
    }

    pub fn get(&self) -> HealthStatus {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.tx.subscribe()
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}
