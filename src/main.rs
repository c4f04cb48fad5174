//! Trace query server.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                 QUERY SERVER                  │
//!                         │                                               │
//!   gRPC client ──────────┼─▶┌──────────┐   ┌─────┐   ┌──────────────┐   │
//!                         │  │   net    │──▶│ tls │──▶│ grpc adapter │─┐ │
//!   HTTP client ──────────┼─▶│ listener │   └─────┘   ├──────────────┤ │ │
//!                         │  │  (+mux)  │──────────────▶ http adapter │─┤ │
//!                         │  └──────────┘             └──────────────┘ │ │
//!                         │                   tenancy gate             ▼ │
//!                         │                              ┌──────────────┐│
//!                         │                              │ QueryService ││
//!                         │                              └──────────────┘│
//!                         │  lifecycle · health · observability · config │
//!                         └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use spanquery::config::{load_config, AppConfig};
use spanquery::lifecycle::signals::wait_for_signal;
use spanquery::observability::{logging, metrics};
use spanquery::query::{MemoryQueryService, Trace};
use spanquery::{Server, ServerDeps};

#[derive(Parser)]
#[command(name = "spanquery", version, about = "Trace query server (gRPC + HTTP/JSON)")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.grpc_host_port`.
    #[arg(long)]
    grpc_host_port: Option<String>,

    /// Override `server.http_host_port`.
    #[arg(long)]
    http_host_port: Option<String>,

    /// JSON file with an array of traces to serve from memory.
    #[arg(long)]
    traces: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(addr) = cli.grpc_host_port.clone() {
        config.server.grpc_host_port = addr;
    }
    if let Some(addr) = cli.http_host_port.clone() {
        config.server.http_host_port = addr;
    }

    logging::init(config.observability.log_format)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "spanquery starting");

    if let Some(addr) = &config.observability.metrics_address {
        match addr.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::warn!(metrics_address = %addr, error = %e, "Invalid metrics address, exporter disabled"),
        }
    }

    tracing::info!(
        grpc_host_port = %config.server.grpc_host_port,
        http_host_port = %config.server.http_host_port,
        grpc_tls = config.server.tls_grpc.enabled,
        http_tls = config.server.tls_http.enabled,
        tenancy = config.server.tenancy.enabled,
        "Configuration loaded"
    );

    let query = match &cli.traces {
        Some(path) => {
            let traces: Vec<Trace> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            tracing::info!(path = %path.display(), traces = traces.len(), "Loaded traces");
            MemoryQueryService::with_traces(traces)
        }
        None => MemoryQueryService::new(),
    };
    let query = Arc::new(query);
    let server = Server::new(config.server, ServerDeps::new(query))?;
    server.start().await?;

    wait_for_signal().await;

    server.close().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
