use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tonic::metadata::MetadataValue;
use tonic::Request;

use spanquery::config::ClientTlsOptions;
use spanquery::grpc::proto::api_v2::{
    GetDependenciesRequest, GetOperationsRequest, GetServicesRequest, GetTraceRequest,
};
use spanquery::QueryClient;

#[derive(Parser)]
#[command(name = "spanquery-cli")]
#[command(about = "Query a spanquery server over gRPC", long_about = None)]
struct Cli {
    /// gRPC endpoint, `host:port`.
    #[arg(short, long, default_value = "localhost:16685")]
    addr: String,

    /// Tenant sent in the `x-tenant` metadata.
    #[arg(short, long)]
    tenant: Option<String>,

    /// Bearer token sent as `authorization` metadata.
    #[arg(long)]
    token: Option<String>,

    /// Connect over TLS, trusting this CA bundle.
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Name to verify in the server certificate.
    #[arg(long)]
    server_name: Option<String>,

    /// Client certificate for mutual TLS.
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// Client private key for mutual TLS.
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List services with stored spans
    Services,
    /// List operations of a service
    Operations {
        service: String,
        #[arg(long)]
        span_kind: Option<String>,
    },
    /// Fetch one trace by ID
    Trace { trace_id: String },
    /// Service dependency links for the last `lookback` seconds
    Dependencies {
        #[arg(long, default_value_t = 86_400)]
        lookback: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let tls = (cli.ca.is_some() || cli.cert.is_some()).then(|| ClientTlsOptions {
        enabled: true,
        ca_path: cli.ca.clone(),
        server_name: cli.server_name.clone(),
        cert_path: cli.cert.clone(),
        key_path: cli.key.clone(),
    });
    let mut client = QueryClient::connect(&cli.addr, tls.as_ref()).await?;

    match &cli.command {
        Commands::Services => {
            let response = client.get_services(request(&cli, GetServicesRequest {})?).await?;
            print_response(response.into_inner());
        }
        Commands::Operations { service, span_kind } => {
            let message = GetOperationsRequest {
                service: service.clone(),
                span_kind: span_kind.clone().unwrap_or_default(),
            };
            let response = client.get_operations(request(&cli, message)?).await?;
            print_response(response.into_inner());
        }
        Commands::Trace { trace_id } => {
            let message = GetTraceRequest {
                trace_id: trace_id.clone(),
            };
            let response = client.get_trace(request(&cli, message)?).await?;
            print_response(response.into_inner());
        }
        Commands::Dependencies { lookback } => {
            let message = GetDependenciesRequest {
                end_time_micros: 0,
                lookback_micros: lookback.saturating_mul(1_000_000),
            };
            let response = client.get_dependencies(request(&cli, message)?).await?;
            print_response(response.into_inner());
        }
    }

    Ok(())
}

/// Wrap `message` with the tenant and bearer-token metadata from the CLI.
fn request<T>(cli: &Cli, message: T) -> Result<Request<T>, Box<dyn std::error::Error>> {
    let mut request = Request::new(message);
    if let Some(tenant) = &cli.tenant {
        request.metadata_mut().insert("x-tenant", MetadataValue::try_from(tenant.as_str())?);
    }
    if let Some(token) = &cli.token {
        request
            .metadata_mut()
            .insert("authorization", MetadataValue::try_from(format!("Bearer {token}"))?);
    }
    Ok(request)
}

fn print_response(message: impl std::fmt::Debug) {
    println!("{message:#?}");
}
