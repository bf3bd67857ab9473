use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;

use filmorate_api::{
    config::{Config, StorageKind},
    db::{create_pool, create_redis_client, Cache, EntityStore, MemoryStore, PgStore},
    routes::{create_router, AppState},
};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,filmorate_api=debug".into()),
        )
        .init();

    let store: Arc<dyn EntityStore> = match config.storage {
        StorageKind::Memory => {
            tracing::info!("Using in-memory entity store");
            Arc::new(MemoryStore::new())
        }
        StorageKind::Postgres => {
            let pool = create_pool(
                &config.database_url,
                config.database_max_connections,
                Duration::from_secs(config.database_acquire_timeout_secs),
            )
            .await
            .context("failed to connect to PostgreSQL")?;
            tracing::info!(
                max_connections = config.database_max_connections,
                "Using PostgreSQL entity store"
            );
            Arc::new(PgStore::new(pool))
        }
    };

    let (cache, cache_handle) = match &config.redis_url {
        Some(url) => {
            let client = create_redis_client(url).context("invalid REDIS_URL")?;
            let (cache, handle) = Cache::new(client).await;
            tracing::info!(ttl_secs = config.ranking_cache_ttl_secs, "Ranking cache enabled");
            (Some(cache), Some(handle))
        }
        None => {
            tracing::info!("REDIS_URL not set, ranking cache disabled");
            (None, None)
        }
    };

    let state = AppState::new(store, cache, config.ranking_cache_ttl_secs)
        .await
        .context("failed to initialise application state")?;
    let app = create_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    tracing::info!(%address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(handle) = cache_handle {
        handle.shutdown().await;
    }
    tracing::info!("Server stopped");
    Ok(())
}
