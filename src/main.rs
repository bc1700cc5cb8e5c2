//! request-registry CLI.
//!
//! ```text
//! request-registry [--config registry.toml] fetch <URL> [-H name:value]... [--repeat N]
//! request-registry [--config registry.toml] key <URL> [-H name:value]...
//! ```
//!
//! `fetch` issues N concurrent calls through one cached GET endpoint and
//! reports how many requests actually reached the network.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::Value;

use request_registry::config::{load_config, RegistryConfig};
use request_registry::endpoint::EndpointBuilder;
use request_registry::observability::{init_logging, init_metrics};
use request_registry::transport::{Transport, TransportRequest, TransportResponse};
use request_registry::{GetEndpoint, ReqwestTransport, RequestRegistry, RequestResult};

#[derive(Parser)]
#[command(name = "request-registry")]
#[command(about = "Deduplicating, caching HTTP client", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL through a cached GET endpoint
    Fetch {
        url: String,

        /// Request header as name:value
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Number of concurrent calls
        #[arg(short, long, default_value_t = 1)]
        repeat: usize,
    },
    /// Print the cache key for a URL and headers
    Key {
        url: String,

        /// Request header as name:value
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

/// Counts requests that reach the wrapped transport.
struct CountingTransport {
    inner: ReqwestTransport,
    sent: AtomicUsize,
}

#[async_trait]
impl Transport for CountingTransport {
    async fn send(&self, request: TransportRequest) -> RequestResult<TransportResponse> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.inner.send(request).await
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("Invalid header '{}', expected name:value", raw)),
    }
}

fn endpoint(
    registry: &RequestRegistry,
    url: String,
    headers: &[String],
) -> Result<GetEndpoint<(), Value>, String> {
    let mut builder: EndpointBuilder<(), (), Value, GetEndpoint<(), Value>> =
        registry.get(move |_: &()| url.clone());
    for raw in headers {
        let (name, value) = parse_header(raw)?;
        builder = builder.header(name, value);
    }
    Ok(builder.build())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RegistryConfig::default(),
    };
    init_logging(&config.observability);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    match cli.command {
        Commands::Fetch { url, headers, repeat } => {
            let transport = Arc::new(CountingTransport {
                inner: ReqwestTransport::new(&config.transport)?,
                sent: AtomicUsize::new(0),
            });
            let registry = RequestRegistry::with_transport(config, transport.clone());
            let endpoint = endpoint(&registry, url, &headers)?;

            let calls = (0..repeat.max(1)).map(|_| endpoint.call(()));
            let results = futures_util::future::join_all(calls).await;
            eprintln!(
                "{} call(s), {} request(s) sent",
                repeat.max(1),
                transport.sent.load(Ordering::SeqCst)
            );
            if let Some(result) = results.into_iter().next() {
                println!("{}", serde_json::to_string_pretty(&result?)?);
            }
        }
        Commands::Key { url, headers } => {
            let registry = RequestRegistry::new(config)?;
            let endpoint = endpoint(&registry, url, &headers)?;
            println!("{}", endpoint.cache_key(&())?);
        }
    }

    Ok(())
}
