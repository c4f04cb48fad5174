//! Shared utilities for the integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::field::{Field, Visit};
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use spanquery::config::{ClientTlsOptions, ServerConfig, TlsOptions};
use spanquery::observability::Tracer;
use spanquery::query::{KeyValue, MemoryQueryService, Process, Span, Trace};
use spanquery::{Server, ServerDeps};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

/// Tracing layer recording every event it sees.
#[derive(Debug, Clone, Default)]
pub struct CapturedEvents {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tracer whose dispatch feeds this recorder.
    pub fn tracer(&self) -> Tracer {
        Tracer::from_dispatch(Dispatch::new(tracing_subscriber::registry().with(self.clone())))
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn find(&self, message: &str) -> Option<CapturedEvent> {
        self.events().into_iter().find(|e| e.message == message)
    }

    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.events().into_iter().filter(|e| e.level == level).collect()
    }
}

struct FieldVisitor<'a> {
    message: &'a mut String,
    fields: &'a mut BTreeMap<String, String>,
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, format!("{value:?}"));
    }
}

impl FieldVisitor<'_> {
    fn record(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            *self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedEvents {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        let mut fields = BTreeMap::new();
        event.record(&mut FieldVisitor {
            message: &mut message,
            fields: &mut fields,
        });

        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message,
            fields,
        });
    }
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

pub const SERVER_NAME: &str = "example.com";

/// PEM material written to a temporary directory.
pub struct TestPki {
    pub dir: TempDir,
    pub ca_cert: PathBuf,
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    /// A CA unrelated to the server and client certificates.
    pub other_ca_cert: PathBuf,
    /// Client identity issued by `other_ca_cert`.
    pub other_client_cert: PathBuf,
    pub other_client_key: PathBuf,
}

fn ca(common_name: &str) -> Certificate {
    let mut params = CertificateParams::default();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, common_name);
    Certificate::from_params(params).unwrap()
}

fn leaf(common_name: &str, sans: Vec<String>, usage: ExtendedKeyUsagePurpose) -> Certificate {
    let mut params = CertificateParams::new(sans);
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, common_name);
    params.extended_key_usages = vec![usage];
    Certificate::from_params(params).unwrap()
}

impl TestPki {
    pub fn generate() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, contents: String| {
            let path = dir.path().join(name);
            std::fs::write(&path, contents).unwrap();
            path
        };

        let ca = ca("spanquery test CA");
        let other_ca = self::ca("spanquery other CA");
        let server = leaf("server", vec![SERVER_NAME.to_string()], ExtendedKeyUsagePurpose::ServerAuth);
        let client = leaf("client", vec!["client".to_string()], ExtendedKeyUsagePurpose::ClientAuth);
        let other_client = leaf("intruder", vec!["intruder".to_string()], ExtendedKeyUsagePurpose::ClientAuth);

        Self {
            ca_cert: write("ca.pem", ca.serialize_pem().unwrap()),
            server_cert: write("server.pem", server.serialize_pem_with_signer(&ca).unwrap()),
            server_key: write("server.key", server.serialize_private_key_pem()),
            client_cert: write("client.pem", client.serialize_pem_with_signer(&ca).unwrap()),
            client_key: write("client.key", client.serialize_private_key_pem()),
            other_ca_cert: write("other-ca.pem", other_ca.serialize_pem().unwrap()),
            other_client_cert: write("other-client.pem", other_client.serialize_pem_with_signer(&other_ca).unwrap()),
            other_client_key: write("other-client.key", other_client.serialize_private_key_pem()),
            dir,
        }
    }

    pub fn server_tls(&self) -> TlsOptions {
        TlsOptions::server(&self.server_cert, &self.server_key)
    }

    pub fn mutual_server_tls(&self) -> TlsOptions {
        self.server_tls().with_client_ca(&self.ca_cert)
    }

    /// Client options trusting the test CA, without a client identity.
    pub fn client_tls(&self) -> ClientTlsOptions {
        ClientTlsOptions {
            enabled: true,
            ca_path: Some(self.ca_cert.clone()),
            server_name: Some(SERVER_NAME.to_string()),
            cert_path: None,
            key_path: None,
        }
    }

    pub fn mutual_client_tls(&self) -> ClientTlsOptions {
        ClientTlsOptions {
            cert_path: Some(self.client_cert.clone()),
            key_path: Some(self.client_key.clone()),
            ..self.client_tls()
        }
    }
}

// ---------------------------------------------------------------------------
// Servers and clients
// ---------------------------------------------------------------------------

/// Both endpoints on separate ephemeral loopback ports.
pub fn ephemeral_config() -> ServerConfig {
    ServerConfig {
        grpc_host_port: "127.0.0.1:0".into(),
        http_host_port: "127.0.0.1:0".into(),
        shutdown_grace_secs: 1,
        ..ServerConfig::default()
    }
}

/// A loopback address whose port was free a moment ago.
pub fn free_addr() -> SocketAddr {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap()
}

/// Both endpoints on one fixed loopback port.
pub fn shared_config() -> ServerConfig {
    let addr = free_addr().to_string();
    ServerConfig {
        grpc_host_port: addr.clone(),
        http_host_port: addr,
        shutdown_grace_secs: 1,
        ..ServerConfig::default()
    }
}

pub struct TestServer {
    pub server: Server,
    pub query: Arc<MemoryQueryService>,
    pub logs: CapturedEvents,
}

impl TestServer {
    pub async fn start(config: ServerConfig) -> Self {
        let query = Arc::new(MemoryQueryService::with_traces(fixture_traces()));
        let logs = CapturedEvents::new();
        let server = Server::new(config, ServerDeps::new(query.clone()).with_tracer(logs.tracer())).unwrap();
        server.start().await.unwrap();
        Self { server, query, logs }
    }

    pub fn grpc_addr(&self) -> String {
        self.server.grpc_addr().unwrap().to_string()
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.server.http_addr().unwrap(), path)
    }

    pub async fn close(self) -> CapturedEvents {
        self.server.close().await.unwrap();
        self.logs
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// One HTTP/1.1 GET over TLS. Returns the status and body.
pub async fn https_get(
    addr: SocketAddr,
    tls: &ClientTlsOptions,
    path: &str,
    headers: &[(&str, &str)],
) -> Result<(StatusCode, Bytes), BoxError> {
    let mut config = (*tls.client_config()?).clone();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = tls.resolve_server_name("localhost")?;

    let tcp = TcpStream::connect(addr).await?;
    let stream = connector.connect(server_name, tcp).await?;
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut request = hyper::Request::builder().uri(path).header(hyper::header::HOST, SERVER_NAME);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = sender.send_request(request.body(Empty::<Bytes>::new())?).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    Ok((status, body))
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const TRACE_ID: &str = "0123456789abcdef";

fn span(id: &str, parent: &str, service: &str, operation: &str, start_time: i64) -> Span {
    Span {
        trace_id: TRACE_ID.into(),
        span_id: id.into(),
        parent_span_id: parent.into(),
        operation_name: operation.into(),
        span_kind: "server".into(),
        start_time,
        duration: 1_500,
        tags: vec![KeyValue::new("http.method", "GET")],
        process: Process {
            service_name: service.into(),
            tags: Vec::new(),
        },
    }
}

/// One trace where `frontend` calls `orders`.
pub fn fixture_traces() -> Vec<Trace> {
    let now = spanquery::query::now_micros();
    vec![Trace {
        trace_id: TRACE_ID.into(),
        spans: vec![
            span("a1", "", "frontend", "GET /orders", now - 5_000_000),
            span("b2", "a1", "orders", "list", now - 4_999_000),
        ],
    }]
}
