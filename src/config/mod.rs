//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, address parsing)
//!     → AppConfig (validated, immutable)
//!     → ServerConfig handed to lifecycle::Server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AppConfig, ClientTlsOptions, ObservabilityConfig, ServerConfig, TenancyOptions, TlsOptions,
};
pub use validation::{parse_host_port, validate_config, HostPort, ValidatedAddresses, ValidationError};
