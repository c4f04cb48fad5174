//! Trace query server library.
//!
//! Serves one query backend over gRPC and HTTP/JSON at the same time, with
//! per-endpoint (mutual) TLS, an optional shared port and a tenancy gate.

// Core subsystems
pub mod config;
pub mod grpc;
pub mod http;
pub mod net;
pub mod query;

// Cross-cutting concerns
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod tenancy;

pub mod client;

pub use client::QueryClient;
pub use config::{AppConfig, ServerConfig};
pub use error::ServerError;
pub use lifecycle::{Server, ServerDeps};
