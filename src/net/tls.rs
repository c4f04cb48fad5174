//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Load PEM certificate chains, private keys and CA bundles
//! - Build per-endpoint `rustls::ServerConfig` (optionally requiring client certs)
//! - Build `rustls::ClientConfig` for [`crate::client::QueryClient`]
//!
//! # Design Decisions
//! - The `ring` provider is pinned explicitly; no process-wide default is installed
//! - Every error names the endpoint it belongs to
//! - Disabled options are never read

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::{VerifierBuilderError, WebPkiClientVerifier};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use thiserror::Error;

use crate::config::{ClientTlsOptions, TlsOptions};
use crate::net::Protocol;

/// Endpoint label used for client-side errors.
const CLIENT_ENDPOINT: &str = "client";

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("{endpoint}: failed to read {kind} from {}: {source}", .path.display())]
    Read {
        endpoint: &'static str,
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{endpoint}: no certificates found in {}", .path.display())]
    EmptyChain { endpoint: &'static str, path: PathBuf },

    #[error("{endpoint}: no private key found in {}", .path.display())]
    MissingKey { endpoint: &'static str, path: PathBuf },

    #[error("{endpoint}: invalid CA certificate in {}: {source}", .path.display())]
    Ca {
        endpoint: &'static str,
        path: PathBuf,
        #[source]
        source: rustls::Error,
    },

    #[error("{endpoint}: failed to build client certificate verifier: {source}")]
    Verifier {
        endpoint: &'static str,
        #[source]
        source: VerifierBuilderError,
    },

    #[error("{endpoint}: invalid TLS configuration: {source}")]
    Rustls {
        endpoint: &'static str,
        #[source]
        source: rustls::Error,
    },

    #[error("{endpoint}: client certificate and key must be configured together")]
    IncompleteIdentity { endpoint: &'static str },
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn open(endpoint: &'static str, kind: &'static str, path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            endpoint,
            kind,
            path: path.to_path_buf(),
            source,
        })
}

fn load_certs(
    endpoint: &'static str,
    kind: &'static str,
    path: &Path,
) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(endpoint, kind, path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            endpoint,
            kind,
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::EmptyChain {
            endpoint,
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

fn load_private_key(endpoint: &'static str, path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(endpoint, "private key", path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Read {
            endpoint,
            kind: "private key",
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::MissingKey {
            endpoint,
            path: path.to_path_buf(),
        })
}

fn load_roots(endpoint: &'static str, path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(endpoint, "CA bundle", path)? {
        roots.add(cert).map_err(|source| TlsError::Ca {
            endpoint,
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(roots)
}

/// Build the server-side TLS context for one endpoint.
///
/// Returns `Ok(None)` when TLS is disabled for the endpoint.
pub fn server_config(
    protocol: Protocol,
    options: &TlsOptions,
) -> Result<Option<Arc<ServerConfig>>, TlsError> {
    if !options.enabled {
        return Ok(None);
    }
    let endpoint = protocol.as_str();

    let certs = load_certs(endpoint, "certificate", &options.cert_path)?;
    let key = load_private_key(endpoint, &options.key_path)?;

    let builder = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|source| TlsError::Rustls { endpoint, source })?;

    let builder = match &options.client_ca_path {
        Some(ca_path) => {
            let roots = load_roots(endpoint, ca_path)?;
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider())
                .build()
                .map_err(|source| TlsError::Verifier { endpoint, source })?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };

    let mut config = builder
        .with_single_cert(certs, key)
        .map_err(|source| TlsError::Rustls { endpoint, source })?;
    config.alpn_protocols = protocol.alpn();

    tracing::debug!(
        endpoint,
        cert = %options.cert_path.display(),
        mutual = options.client_ca_path.is_some(),
        "TLS configuration loaded"
    );

    Ok(Some(Arc::new(config)))
}

/// Build a client-side TLS context.
///
/// Trusts `ca_path` when set, otherwise the Mozilla root set. ALPN is left
/// to the caller.
pub fn client_config(options: &ClientTlsOptions) -> Result<ClientConfig, TlsError> {
    let endpoint = CLIENT_ENDPOINT;

    let roots = match &options.ca_path {
        Some(path) => load_roots(endpoint, path)?,
        None => RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    };

    let builder = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|source| TlsError::Rustls { endpoint, source })?
        .with_root_certificates(roots);

    match (&options.cert_path, &options.key_path) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certs(endpoint, "certificate", cert_path)?;
            let key = load_private_key(endpoint, key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|source| TlsError::Rustls { endpoint, source })
        }
        (None, None) => Ok(builder.with_no_client_auth()),
        _ => Err(TlsError::IncompleteIdentity { endpoint }),
    }
}

impl ClientTlsOptions {
    /// Build the rustls client context described by these options.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>, TlsError> {
        client_config(self).map(Arc::new)
    }

    /// Name to verify in the server certificate: the configured override,
    /// else `host`.
    pub fn resolve_server_name(&self, host: &str) -> Result<ServerName<'static>, rustls::pki_types::InvalidDnsNameError> {
        let name = self.server_name.as_deref().unwrap_or(host);
        let name = name.trim_start_matches('[').trim_end_matches(']');
        ServerName::try_from(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_pair(dir: &Path) -> (PathBuf, PathBuf) {
        let mut params = rcgen::CertificateParams::new(vec!["localhost".to_string()]);
        params.is_ca = rcgen::IsCa::NoCa;
        let cert = rcgen::Certificate::from_params(params).unwrap();
        let cert_path = dir.join("server.pem");
        let key_path = dir.join("server.key");
        fs::write(&cert_path, cert.serialize_pem().unwrap()).unwrap();
        fs::write(&key_path, cert.serialize_private_key_pem()).unwrap();
        (cert_path, key_path)
    }

    #[test]
    fn disabled_options_are_not_read() {
        let options = TlsOptions {
            enabled: false,
            cert_path: "/does/not/exist.pem".into(),
            key_path: "/does/not/exist.key".into(),
            client_ca_path: Some("/does/not/exist-ca.pem".into()),
        };
        assert!(server_config(Protocol::Grpc, &options).unwrap().is_none());
    }

    #[test]
    fn missing_certificate_names_endpoint() {
        let options = TlsOptions::server("/does/not/exist.pem", "/does/not/exist.key");
        let err = server_config(Protocol::Http, &options).unwrap_err();
        assert!(matches!(err, TlsError::Read { endpoint: "http", kind: "certificate", .. }));
        assert!(err.to_string().starts_with("http:"));
    }

    #[test]
    fn empty_certificate_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_, key_path) = write_pair(dir.path());
        let empty = dir.path().join("empty.pem");
        fs::write(&empty, "").unwrap();

        let err = server_config(Protocol::Grpc, &TlsOptions::server(&empty, &key_path)).unwrap_err();
        assert!(matches!(err, TlsError::EmptyChain { endpoint: "grpc", .. }));
    }

    #[test]
    fn key_file_without_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (cert_path, _) = write_pair(dir.path());

        let err = server_config(Protocol::Grpc, &TlsOptions::server(&cert_path, &cert_path)).unwrap_err();
        assert!(matches!(err, TlsError::MissingKey { endpoint: "grpc", .. }));
    }

    #[test]
    fn alpn_depends_on_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let (cert_path, key_path) = write_pair(dir.path());
        let options = TlsOptions::server(&cert_path, &key_path);

        let grpc = server_config(Protocol::Grpc, &options).unwrap().unwrap();
        assert_eq!(grpc.alpn_protocols, vec![b"h2".to_vec()]);

        let http = server_config(Protocol::Http, &options).unwrap().unwrap();
        assert_eq!(http.alpn_protocols, vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
    }

    #[test]
    fn mutual_tls_loads_client_ca() {
        let dir = tempfile::tempdir().unwrap();
        let (cert_path, key_path) = write_pair(dir.path());
        let options = TlsOptions::server(&cert_path, &key_path).with_client_ca(&cert_path);
        assert!(server_config(Protocol::Grpc, &options).unwrap().is_some());
    }

    #[test]
    fn client_identity_requires_both_halves() {
        let options = ClientTlsOptions {
            enabled: true,
            cert_path: Some("/tmp/client.pem".into()),
            ..ClientTlsOptions::default()
        };
        assert!(matches!(
            client_config(&options).unwrap_err(),
            TlsError::IncompleteIdentity { .. }
        ));
    }

    #[test]
    fn client_defaults_to_webpki_roots() {
        let options = ClientTlsOptions {
            enabled: true,
            ..ClientTlsOptions::default()
        };
        assert!(client_config(&options).is_ok());
    }

    #[test]
    fn server_name_prefers_override() {
        let options = ClientTlsOptions {
            server_name: Some("example.com".into()),
            ..ClientTlsOptions::default()
        };
        let name = options.resolve_server_name("127.0.0.1").unwrap();
        assert_eq!(name.to_str(), "example.com");

        let name = ClientTlsOptions::default().resolve_server_name("[::1]").unwrap();
        assert!(matches!(name, ServerName::IpAddress(_)));
    }
}
