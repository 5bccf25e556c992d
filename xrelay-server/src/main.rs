//! xrelay server
//!
//! Cross-chain deposit relay: watches bridge deposits on every configured
//! chain and forwards them to the validator signing network.

mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::ConfigLoader;
use server::{build_router, run_server};
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use xrelay_core::processors::EventPipeline;
use xrelay_core::sources::DefaultSourceFactory;

/// xrelay - cross-chain deposit relay
#[derive(Parser, Debug)]
#[command(name = "xrelay-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "XRELAY_CONFIG", default_value = "./xrelay-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long, default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.log_json);

    tracing::info!("Starting xrelay-server v{}", env!("CARGO_PKG_VERSION"));

    let loaded_config = ConfigLoader::new(&args.config, args.listen)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let listen_addr = loaded_config.listen;
    let relay_config = Arc::new(loaded_config.relay);

    let pipeline = EventPipeline::new(relay_config, DefaultSourceFactory::default())
        .start()
        .map_err(|e| {
            tracing::error!("Failed to start pipeline: {}", e);
            e
        })?;

    let router = build_router(AppState::new(pipeline.clone()));

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    let report = pipeline.shutdown().await;
    tracing::info!(
        drained = report.drained,
        aborted_tasks = report.aborted_tasks,
        "Server shutdown complete"
    );

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
