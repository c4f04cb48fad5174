//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Parse `host:port` endpoint addresses
//! - Validate value ranges (connection limits, header names)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<ValidatedAddresses, Vec<ValidationError>>
//! - Runs before any socket is touched

use std::fmt;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {endpoint} address {value:?}: {reason}")]
    InvalidAddress {
        endpoint: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("invalid tenancy header {0:?}")]
    InvalidTenancyHeader(String),

    #[error("max_connections must be greater than zero")]
    ZeroMaxConnections,
}

/// A parsed `host:port` endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPort {
    /// Host without IPv6 brackets. Empty means all interfaces.
    pub host: String,
    pub port: u16,
}

impl HostPort {
    /// Whether the address names every interface (`:port`).
    pub fn is_wildcard(&self) -> bool {
        self.host.is_empty()
    }

    /// Whether the OS picks the port.
    pub fn is_ephemeral(&self) -> bool {
        self.port == 0
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Both endpoint addresses, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAddresses {
    pub grpc: HostPort,
    pub http: HostPort,
}

/// Parse a `host:port` string for the named endpoint.
///
/// Accepts `":16686"`, `"127.0.0.1:0"`, `"localhost:80"` and `"[::1]:443"`.
/// Rejects bare ports, non-numeric ports and empty strings.
pub fn parse_host_port(endpoint: &'static str, value: &str) -> Result<HostPort, ValidationError> {
    let invalid = |reason| ValidationError::InvalidAddress {
        endpoint,
        value: value.to_string(),
        reason,
    };

    if value.trim().is_empty() {
        return Err(invalid("address is empty"));
    }

    let (host, port) = if let Some(rest) = value.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| invalid("unterminated IPv6 bracket"))?;
        let port = tail
            .strip_prefix(':')
            .ok_or_else(|| invalid("missing port"))?;
        (host, port)
    } else {
        let (host, port) = value
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;
        if host.contains(':') {
            return Err(invalid("IPv6 hosts must be bracketed"));
        }
        (host, port)
    };

    if host.chars().any(char::is_whitespace) {
        return Err(invalid("host contains whitespace"));
    }
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("port is not numeric"));
    }
    let port: u16 = port.parse().map_err(|_| invalid("port out of range"))?;

    Ok(HostPort {
        host: host.to_string(),
        port,
    })
}

/// Validate the server configuration and parse its endpoint addresses.
pub fn validate_config(config: &ServerConfig) -> Result<ValidatedAddresses, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let grpc = parse_host_port("grpc", &config.grpc_host_port)
        .map_err(|e| errors.push(e))
        .ok();
    let http = parse_host_port("http", &config.http_host_port)
        .map_err(|e| errors.push(e))
        .ok();

    if config.tenancy.enabled && HeaderName::from_bytes(config.tenancy.header.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidTenancyHeader(
            config.tenancy.header.clone(),
        ));
    }

    if config.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    match (grpc, http) {
        (Some(grpc), Some(http)) if errors.is_empty() => Ok(ValidatedAddresses { grpc, http }),
        _ => Err(errors),
    }
}
