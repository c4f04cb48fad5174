//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! lifecycle::Server
//!     → state.rs (HealthCheck: Unavailable → Ready → Unavailable)
//!     → reporter.rs (forwards every change)
//!     → grpc.health.v1.Health (tonic-health)
//! ```
//!
//! # Design Decisions
//! - The server owns a `HealthCheck` handle; other components only observe it
//! - Status changes are pushed, never polled

pub mod reporter;
pub mod state;

pub use state::{HealthCheck, HealthStatus};
