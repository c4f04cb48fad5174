//! Tenant header enforcement shared by both protocol adapters.
//!
//! The gate only checks that a non-empty tenant is present. Whether the
//! caller may use that tenant is left to the query service.

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::TenancyOptions;

/// The tenant a request is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tenant(pub String);

impl Tenant {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TenancyError {
    #[error("missing tenant header {0}")]
    MissingTenant(String),
}

/// Decides whether a request carries an acceptable tenant.
#[derive(Debug, Clone)]
pub struct TenancyManager {
    enabled: bool,
    header: HeaderName,
}

impl TenancyManager {
    /// Build from options. An unparseable header falls back to `x-tenant`;
    /// `validate_config` rejects that case before the server is built.
    pub fn new(options: &TenancyOptions) -> Self {
        let header = HeaderName::from_bytes(options.header.to_ascii_lowercase().as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static("x-tenant"));
        Self {
            enabled: options.enabled,
            header,
        }
    }

    pub fn disabled() -> Self {
        Self::new(&TenancyOptions::default())
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Lower-case header name, also used as the gRPC metadata key.
    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// Check the tenant value read from the request.
    ///
    /// Returns `Ok(None)` when tenancy is disabled.
    pub fn check(&self, value: Option<&str>) -> Result<Option<Tenant>, TenancyError> {
        if !self.enabled {
            return Ok(None);
        }
        match value.map(str::trim) {
            Some(tenant) if !tenant.is_empty() => Ok(Some(Tenant(tenant.to_string()))),
            _ => Err(TenancyError::MissingTenant(self.header.to_string())),
        }
    }
}
