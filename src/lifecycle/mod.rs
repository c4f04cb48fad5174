//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Construction (server.rs):
//!     Validate addresses → Load TLS → Resolve topology → Build adapters
//!
//! Start (server.rs):
//!     Bind listeners → Spawn accept loops → Health Ready → "Query server started"
//!
//! Close (server.rs, shutdown.rs):
//!     Health Unavailable → Signal loops → Drain connections → Join tasks
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → main calls Server::close
//! ```
//!
//! # Design Decisions
//! - Construction does no I/O besides reading TLS files
//! - Ordered shutdown: stop accept, drain, close
//! - Draining is bounded by the configured grace period

pub mod server;
pub mod shutdown;
pub mod signals;

pub use server::{Server, ServerDeps};
pub use shutdown::Shutdown;
