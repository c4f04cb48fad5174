//! Port topology resolution.
//!
//! Decides whether gRPC and HTTP get their own sockets or share one, and
//! carries the TLS context each accepted connection will need.

use std::sync::Arc;

use rustls::ServerConfig;
use thiserror::Error;

use crate::config::{HostPort, ValidatedAddresses};
use crate::net::Protocol;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("gRPC and HTTP both enable TLS on shared address {addr}; a shared port supports TLS for at most one protocol")]
    SharedPortDualTls { addr: String },
}

/// One socket serving one protocol.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub protocol: Protocol,
    pub addr: HostPort,
    pub tls: Option<Arc<ServerConfig>>,
}

/// How the two protocols map onto sockets.
#[derive(Debug, Clone)]
pub enum Topology {
    /// Each protocol binds its own address with its own TLS settings.
    Separate { grpc: Endpoint, http: Endpoint },

    /// Both protocols are demultiplexed from one socket. At most one of them
    /// terminates TLS.
    Shared {
        addr: HostPort,
        grpc_tls: Option<Arc<ServerConfig>>,
        http_tls: Option<Arc<ServerConfig>>,
    },
}

impl Topology {
    /// Resolve the topology for validated addresses and loaded TLS contexts.
    ///
    /// Addresses are shared only when they are identical and name a fixed
    /// port; two `:0` endpoints get two ephemeral sockets.
    pub fn resolve(
        addrs: &ValidatedAddresses,
        grpc_tls: Option<Arc<ServerConfig>>,
        http_tls: Option<Arc<ServerConfig>>,
    ) -> Result<Self, TopologyError> {
        if addrs.grpc != addrs.http || addrs.grpc.is_ephemeral() {
            return Ok(Topology::Separate {
                grpc: Endpoint {
                    protocol: Protocol::Grpc,
                    addr: addrs.grpc.clone(),
                    tls: grpc_tls,
                },
                http: Endpoint {
                    protocol: Protocol::Http,
                    addr: addrs.http.clone(),
                    tls: http_tls,
                },
            });
        }

        if grpc_tls.is_some() && http_tls.is_some() {
            return Err(TopologyError::SharedPortDualTls {
                addr: addrs.grpc.to_string(),
            });
        }

        Ok(Topology::Shared {
            addr: addrs.grpc.clone(),
            grpc_tls,
            http_tls,
        })
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Topology::Shared { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_host_port;

    fn addrs(grpc: &str, http: &str) -> ValidatedAddresses {
        ValidatedAddresses {
            grpc: parse_host_port("grpc", grpc).unwrap(),
            http: parse_host_port("http", http).unwrap(),
        }
    }

    fn dummy_tls() -> Arc<ServerConfig> {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let der = rustls::pki_types::CertificateDer::from(cert.serialize_der().unwrap());
        let key = rustls::pki_types::PrivateKeyDer::Pkcs8(cert.serialize_private_key_der().into());
        let config = ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![der], key)
            .unwrap();
        Arc::new(config)
    }

    #[test]
    fn distinct_addresses_are_separate() {
        let topology = Topology::resolve(&addrs(":16685", ":16686"), Some(dummy_tls()), Some(dummy_tls())).unwrap();
        assert!(!topology.is_shared());
    }

    #[test]
    fn identical_addresses_share_a_socket() {
        let topology = Topology::resolve(&addrs("127.0.0.1:8080", "127.0.0.1:8080"), None, None).unwrap();
        assert!(topology.is_shared());

        let topology = Topology::resolve(&addrs("127.0.0.1:8080", "127.0.0.1:8080"), None, Some(dummy_tls())).unwrap();
        match topology {
            Topology::Shared { grpc_tls, http_tls, .. } => {
                assert!(grpc_tls.is_none());
                assert!(http_tls.is_some());
            }
            Topology::Separate { .. } => panic!("expected shared topology"),
        }
    }

    #[test]
    fn shared_port_rejects_two_tls_identities() {
        let err = Topology::resolve(&addrs(":8080", ":8080"), Some(dummy_tls()), Some(dummy_tls())).unwrap_err();
        assert_eq!(err, TopologyError::SharedPortDualTls { addr: ":8080".into() });
    }

    #[test]
    fn ephemeral_ports_are_never_shared() {
        let topology = Topology::resolve(&addrs("127.0.0.1:0", "127.0.0.1:0"), Some(dummy_tls()), Some(dummy_tls())).unwrap();
        assert!(!topology.is_shared());
    }

    #[test]
    fn textually_different_hosts_are_separate() {
        let topology = Topology::resolve(&addrs("localhost:8080", "127.0.0.1:8080"), None, None).unwrap();
        assert!(!topology.is_shared());
    }
}
