//! Local API gateway emulator.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │               GATEWAY EMULATOR               │
//!     Client Request      │  ┌────────┐   ┌───────────┐   ┌───────────┐  │
//!     ────────────────────┼─▶│  cors  │──▶│  request  │──▶│  backend  │──┼──▶ Backend
//!                         │  │decision│   │ normalize │   │ dispatch  │  │    (SPI)
//!                         │  └────────┘   └─────┬─────┘   └─────┬─────┘  │
//!                         │                     │ reject        │ error  │
//!                         │                     ▼               ▼        │
//!     Client Response     │               ┌─────────────────────────┐    │
//!     ◀───────────────────┼───────────────│ response + error render │    │
//!                         │               └─────────────────────────┘    │
//!                         └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use api_gateway_emulator::config::{load_config, validate_config, ConfigError, EmulatorConfig};
use api_gateway_emulator::http::HttpServer;
use api_gateway_emulator::lifecycle::{signals, Shutdown};
use api_gateway_emulator::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "api-gateway-emulator")]
#[command(about = "Local emulator for an API gateway in front of a backend", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override backend.address.
    #[arg(long)]
    backend: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EmulatorConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(backend) = cli.backend {
        config.backend.address = backend;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.address,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(&shutdown);

    let server = HttpServer::new(config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
