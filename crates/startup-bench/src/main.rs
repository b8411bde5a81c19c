//! Startup benchmark - Kubernetes pod startup-time measurement service
//!
//! Each `POST /measure` creates a single-replica deployment and reports the
//! time until its pod answers the health check.

use anyhow::{Context, Result};
use startup_bench::{api, config::BenchConfig};
use startup_lib::{
    create_resolver,
    health::{components, HealthRegistry},
    HealthProber, KubeCluster, Measurer, StructuredLogger,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const BENCH_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting startup-bench");

    let config = BenchConfig::load()?;
    info!(
        namespace = %config.namespace,
        image = %config.image,
        discovery = %config.discovery,
        "Benchmark configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::CLUSTER_API).await;
    health_registry.register(components::MEASUREMENT).await;

    let cluster = KubeCluster::try_default(&config.namespace)
        .await
        .context("failed to build Kubernetes client")?;
    let backend = Arc::new(cluster);

    let resolver = create_resolver(config.discovery, backend.clone(), config.poll_interval());
    let prober = HealthProber::new(config.probe_config())?;
    let logger = StructuredLogger::new(&config.namespace);
    let measurer = Measurer::new(backend, resolver, prober, logger.clone())
        .with_deadline(config.deadline())
        .with_health_path(&config.health_path);

    logger.log_startup(BENCH_VERSION, config.discovery.as_str());

    // Bind before reporting ready so a taken port fails startup
    let listener = api::bind(config.listen_port).await?;

    let app_state = Arc::new(api::AppState::new(measurer, config, health_registry.clone()));
    let shutdown = app_state.shutdown.clone();

    health_registry.set_ready(true).await;

    let mut api_handle = tokio::spawn(api::serve(listener, app_state));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => signal?,
        served = &mut api_handle => {
            error!("API server exited unexpectedly");
            logger.log_shutdown("API server stopped");
            served??;
            anyhow::bail!("API server stopped without a shutdown signal");
        }
    }

    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    shutdown.cancel();
    api_handle.await??;

    Ok(())
}
