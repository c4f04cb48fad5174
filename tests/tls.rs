//! TLS and mutual TLS on separate endpoints.

use spanquery::config::{ClientTlsOptions, ServerConfig};
use spanquery::grpc::proto::api_v2::GetServicesRequest;
use spanquery::QueryClient;
use tracing::Level;

mod common;

use common::{TestPki, TestServer};

/// Whether a gRPC call succeeds with these client options.
async fn grpc_ok(addr: &str, tls: &ClientTlsOptions) -> bool {
    match QueryClient::connect(addr, Some(tls)).await {
        Ok(mut client) => client.get_services(GetServicesRequest {}).await.is_ok(),
        Err(_) => false,
    }
}

async fn http_ok(server: &TestServer, tls: &ClientTlsOptions) -> bool {
    let addr = server.server.http_addr().unwrap();
    matches!(
        common::https_get(addr, tls, "/api/services", &[]).await,
        Ok((status, _)) if status == 200
    )
}

#[tokio::test]
async fn server_tls_requires_trusted_ca_and_matching_name() {
    let pki = TestPki::generate();
    let config = ServerConfig {
        tls_grpc: pki.server_tls(),
        tls_http: pki.server_tls(),
        ..common::ephemeral_config()
    };
    let server = TestServer::start(config).await;
    let grpc = server.grpc_addr();

    assert!(grpc_ok(&grpc, &pki.client_tls()).await);
    assert!(http_ok(&server, &pki.client_tls()).await);

    let untrusted = ClientTlsOptions {
        ca_path: Some(pki.other_ca_cert.clone()),
        ..pki.client_tls()
    };
    assert!(!grpc_ok(&grpc, &untrusted).await);
    assert!(!http_ok(&server, &untrusted).await);

    let system_roots = ClientTlsOptions {
        ca_path: None,
        ..pki.client_tls()
    };
    assert!(!grpc_ok(&grpc, &system_roots).await);

    let wrong_name = ClientTlsOptions {
        server_name: Some("wrong.example.org".into()),
        ..pki.client_tls()
    };
    assert!(!grpc_ok(&grpc, &wrong_name).await);
    assert!(!http_ok(&server, &wrong_name).await);

    // Plaintext on a TLS endpoint is not served.
    assert!(common::http_client()
        .get(server.http_url("/api/services"))
        .send()
        .await
        .is_err());

    let logs = server.close().await;
    assert!(logs.at_level(Level::ERROR).is_empty(), "{:?}", logs.at_level(Level::ERROR));
}

#[tokio::test]
async fn mutual_tls_requires_client_certificate_from_trusted_ca() {
    let pki = TestPki::generate();
    let config = ServerConfig {
        tls_grpc: pki.mutual_server_tls(),
        tls_http: pki.mutual_server_tls(),
        ..common::ephemeral_config()
    };
    let server = TestServer::start(config).await;
    let grpc = server.grpc_addr();

    assert!(grpc_ok(&grpc, &pki.mutual_client_tls()).await);
    assert!(http_ok(&server, &pki.mutual_client_tls()).await);

    // No client certificate.
    assert!(!grpc_ok(&grpc, &pki.client_tls()).await);
    assert!(!http_ok(&server, &pki.client_tls()).await);

    // Client certificate issued by an unknown CA.
    let intruder = ClientTlsOptions {
        cert_path: Some(pki.other_client_cert.clone()),
        key_path: Some(pki.other_client_key.clone()),
        ..pki.client_tls()
    };
    assert!(!grpc_ok(&grpc, &intruder).await);
    assert!(!http_ok(&server, &intruder).await);

    let logs = server.close().await;
    assert!(logs.at_level(Level::ERROR).is_empty());
    assert!(logs
        .events()
        .iter()
        .any(|e| e.level == Level::DEBUG && e.message == "Connection ended with error"));
}

#[tokio::test]
async fn tls_is_configured_per_endpoint() {
    let pki = TestPki::generate();
    let config = ServerConfig {
        tls_http: pki.mutual_server_tls(),
        ..common::ephemeral_config()
    };
    let server = TestServer::start(config).await;

    let mut plain = QueryClient::connect(&server.grpc_addr(), None).await.unwrap();
    let services = plain.get_services(GetServicesRequest {}).await.unwrap().into_inner();
    assert_eq!(services.services.len(), 2);

    assert!(http_ok(&server, &pki.mutual_client_tls()).await);
    assert!(!http_ok(&server, &pki.client_tls()).await);

    drop(plain);
    server.close().await;
}
