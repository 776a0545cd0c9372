use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mesh_registry::clock::SystemClock;
use mesh_registry::liveness::{self, LivenessConfig};
use mesh_registry::storage::postgres::PostgresStorage;
use mesh_registry::{router, AppState, RegistryConfig, Storage};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mesh-registryd", about = "MCP Mesh registry service")]
struct Cli {
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
    #[arg(long, env = "MESH_REGISTRY_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let mut config = RegistryConfig::from_env();
    if let Some(database_url) = cli.database_url {
        config.database_url = database_url;
    }
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }

    let storage = PostgresStorage::connect(&config.database_url).await.context("connecting to registry database")?;
    storage.migrate().await.context("running registry migrations")?;
    let storage: Arc<dyn Storage> = Arc::new(storage);

    let state = AppState::new(storage.clone());
    let app = router(state);

    let listener = TcpListener::bind(&config.bind_address).await.with_context(|| format!("binding {}", config.bind_address))?;
    tracing::info!(bind = %config.bind_address, "mesh registry listening");

    let liveness_storage = storage.clone();
    let liveness_config = LivenessConfig {
        health_check_interval: config.health_check_interval,
        unhealthy_timeout: config.unhealthy_timeout,
    };
    let liveness_handle = tokio::spawn(async move {
        liveness::run(liveness_storage, Arc::new(SystemClock), liveness_config, shutdown_signal()).await;
    });

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("registry server exited")?;

    liveness_handle.await.ok();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
