//! Health server - the workload whose startup time is measured
//!
//! Answers `/health` with `200 OK` as soon as the listener is bound; every
//! other path is a 404.

use anyhow::Result;
use axum::{routing::any, Router};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Minimal HTTP health endpoint
#[derive(Parser, Debug)]
#[command(name = "health-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,
}

async fn health() -> &'static str {
    "OK"
}

fn router() -> Router {
    Router::new().route("/health", any(health))
}

// Single-threaded: the container is expected to run with one CPU
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();

    let addr = format!("0.0.0.0:{}", cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Starting health server");

    axum::serve(listener, router()).await?;

    Ok(())
}
