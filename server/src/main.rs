//! recbase HTTP server
//!
//! Serves the record API for the collections declared in the config file.
//!
//! Usage:
//!   recbase-server --port 8090 --config recbase.toml

use anyhow::{Context, Result};
use clap::Parser;
use recbase_core::{App, AppConfig};
use recbase_server::build_router;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "recbase-server")]
#[command(about = "HTTP record API with rule-based access control")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "8090")]
    port: u16,

    /// Path to the TOML config file
    #[arg(short, long, default_value = "recbase.toml")]
    config: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("recbase server starting...");
    let config = AppConfig::load_from(&args.config);
    let app = App::builder()
        .config(config)
        .build()
        .context("Failed to build the application from config")?;

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port))
        .await
        .with_context(|| format!("Failed to bind HTTP port {}", args.port))?;
    info!("HTTP API listening on port {}", args.port);

    axum::serve(listener, build_router(app))
        .await
        .context("HTTP server failed")?;
    Ok(())
}
