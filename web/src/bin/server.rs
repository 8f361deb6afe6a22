//! Stockhold HTTP server.
//!
//! Connects to Redis, starts the Prometheus exporter and the background sweep,
//! and serves the checkout, webhook and admin routes until SIGINT/SIGTERM.

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use stockhold_engine::Engine;
use stockhold_engine::metrics::register_engine_metrics;
use stockhold_redis::RedisStore;
use stockhold_web::{AppState, Config, build_router};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockhold=info,stockhold_engine=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Stockhold server");
    info!(
        redis_url = %config.redis.url,
        namespace = config.engine.keys.namespace(),
        ttl_secs = config.engine.policy.ttl.as_secs(),
        max_per_item = config.engine.policy.max_per_item,
        max_per_ip = config.engine.policy.max_per_ip,
        sweep_interval_secs = config.engine.sweep.interval.as_secs(),
        "Configuration loaded"
    );

    let metrics_addr: SocketAddr = config
        .metrics
        .address()
        .parse()
        .context("invalid METRICS_HOST/METRICS_PORT")?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("failed to install Prometheus exporter")?;
    register_engine_metrics();
    info!(address = %metrics_addr, "Prometheus metrics available at /metrics");

    info!("Connecting to Redis...");
    let store = RedisStore::connect(&config.redis)
        .await
        .context("failed to connect to Redis")?;
    info!("Redis connected");

    let engine = Engine::new(Arc::new(store), config.engine.clone());

    let (shutdown_tx, _) = broadcast::channel(1);
    let sweep_handle = engine.sweep_scheduler().spawn(shutdown_tx.subscribe());

    let app = build_router(AppState::new(engine));
    let addr = config.server.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    let _ = shutdown_tx.send(());
    if let Err(e) = sweep_handle.await {
        error!(error = %e, "Sweep scheduler task failed");
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
