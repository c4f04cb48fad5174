//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = toml::from_str(content)?;

    validate_config(&config.server).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::LogFormat;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.grpc_host_port, ":16685");
        assert_eq!(config.server.http_host_port, ":16686");
        assert!(!config.server.tenancy.enabled);
        assert_eq!(config.observability.log_format, LogFormat::Text);
    }

    #[test]
    fn parses_tls_and_tenancy() {
        let config = parse_config(
            r#"
            [server]
            grpc_host_port = "127.0.0.1:0"
            http_host_port = "127.0.0.1:0"
            bearer_token_propagation = true

            [server.tls_grpc]
            enabled = true
            cert_path = "/etc/spanquery/server.pem"
            key_path = "/etc/spanquery/server.key"
            client_ca_path = "/etc/spanquery/ca.pem"

            [server.tenancy]
            enabled = true
            header = "x-scope"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert!(config.server.tls_grpc.enabled);
        assert!(config.server.tls_grpc.client_ca_path.is_some());
        assert!(!config.server.tls_http.enabled);
        assert_eq!(config.server.tenancy.header, "x-scope");
        assert!(config.server.bearer_token_propagation);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_address_is_a_validation_error() {
        let err = parse_config(
            r#"
            [server]
            grpc_host_port = "localhost"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("grpc"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = parse_config("[server").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_config(Path::new("/nonexistent/spanquery.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
