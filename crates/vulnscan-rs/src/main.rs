use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vulnscan::{
    adapters::NmapAdapter,
    build_router,
    config::AppConfig,
    db,
    executor::ScanExecutor,
    jobs::spawn_workers,
    store::JobStore,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::load().context("failed to load configuration")?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;

    let store = JobStore::new(pool.clone());
    let wake = Arc::new(Notify::new());
    let shutdown = CancellationToken::new();

    let executor = ScanExecutor::new(Arc::new(NmapAdapter::new(config.nmap_path.clone())))
        .with_max_duration(config.scan_timeout());
    let workers = spawn_workers(
        config.workers,
        store.clone(),
        executor,
        config.poll_interval(),
        wake.clone(),
        shutdown.clone(),
    );

    let app = build_router(AppState::new(store, wake));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, workers = config.workers, "vulnscan-rs listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // Workers finish their current scan before observing the token.
    shutdown.cancel();
    for handle in workers {
        if let Err(e) = handle.await {
            warn!(error = %e, "worker task ended abnormally");
        }
    }
    pool.close().await;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "failed to listen for Ctrl+C, running until killed");
            std::future::pending::<()>().await;
        }
    }
    shutdown.cancel();
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
}
