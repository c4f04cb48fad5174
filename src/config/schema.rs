//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the query
//! server. All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::observability::logging::LogFormat;

/// Root configuration for the `spanquery` binary.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Query server endpoints, TLS and tenancy.
    pub server: ServerConfig,

    /// Logging and metrics exposition.
    pub observability: ObservabilityConfig,
}

/// Configuration of the dual-protocol query server.
///
/// Both endpoints take `host:port`. An empty host binds all interfaces and
/// port `0` asks the OS for an ephemeral port. Identical addresses (with a
/// non-zero port) make both protocols share one socket.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// gRPC endpoint address.
    pub grpc_host_port: String,

    /// HTTP/JSON endpoint address.
    pub http_host_port: String,

    /// TLS for the gRPC endpoint.
    pub tls_grpc: TlsOptions,

    /// TLS for the HTTP endpoint.
    pub tls_http: TlsOptions,

    /// Forward the caller's bearer token to the query service.
    pub bearer_token_propagation: bool,

    /// Tenant header enforcement.
    pub tenancy: TenancyOptions,

    /// Maximum concurrent connections per listener (backpressure).
    pub max_connections: usize,

    /// Time given to open connections to finish after shutdown starts.
    pub shutdown_grace_secs: u64,

    /// Bound on protocol detection and TLS handshakes for new connections.
    pub mux_timeout_ms: u64,

    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_host_port: ":16685".to_string(),
            http_host_port: ":16686".to_string(),
            tls_grpc: TlsOptions::default(),
            tls_http: TlsOptions::default(),
            bearer_token_propagation: false,
            tenancy: TenancyOptions::default(),
            max_connections: 10_000,
            shutdown_grace_secs: 5,
            mux_timeout_ms: 2_000,
            request_timeout_secs: 30,
        }
    }
}

/// Server-side TLS options for one endpoint.
///
/// When `enabled` is false every other field is ignored.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TlsOptions {
    pub enabled: bool,

    /// Path to certificate chain file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,

    /// CA bundle used to verify client certificates. Setting it turns on
    /// mutual TLS.
    pub client_ca_path: Option<PathBuf>,
}

impl TlsOptions {
    /// TLS with a certificate/key pair and no client authentication.
    pub fn server(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            client_ca_path: None,
        }
    }

    /// Require client certificates signed by the CA at `client_ca_path`.
    pub fn with_client_ca(mut self, client_ca_path: impl Into<PathBuf>) -> Self {
        self.client_ca_path = Some(client_ca_path.into());
        self
    }
}

/// Client-side TLS options, used by [`crate::client::QueryClient`] and tests.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ClientTlsOptions {
    pub enabled: bool,

    /// CA bundle to trust. Falls back to the Mozilla root set when absent.
    pub ca_path: Option<PathBuf>,

    /// Name expected in the server certificate. Defaults to the dialed host.
    pub server_name: Option<String>,

    /// Client certificate presented for mutual TLS.
    pub cert_path: Option<PathBuf>,

    /// Private key matching `cert_path`.
    pub key_path: Option<PathBuf>,
}

/// Tenant header enforcement.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TenancyOptions {
    pub enabled: bool,

    /// Header (HTTP) or metadata key (gRPC) carrying the tenant.
    pub header: String,
}

impl Default for TenancyOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            header: default_tenant_header(),
        }
    }
}

fn default_tenant_header() -> String {
    "x-tenant".to_string()
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log output format.
    pub log_format: LogFormat,

    /// Prometheus exporter address (e.g., "0.0.0.0:9464"). Disabled when unset.
    pub metrics_address: Option<String>,
}
