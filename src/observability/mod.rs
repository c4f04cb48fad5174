//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters via the `metrics` facade)
//!
//! Background tasks run under:
//!     → tracer.rs (the dispatch handed to the server at construction)
//!
//! Consumers:
//!     → stdout (text or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are no-ops until a recorder is installed
//! - Spawned tasks inherit the server's dispatch, not the global default

pub mod logging;
pub mod metrics;
pub mod tracer;

pub use tracer::Tracer;
