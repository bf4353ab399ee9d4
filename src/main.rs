//! tg-escrow-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use tg_escrow_gateway::api;
use tg_escrow_gateway::config::{LogFormat, ServiceConfig};
use tg_escrow_gateway::persistence::{MemoryStore, PostgresStore, Store};
use tg_escrow_gateway::runtime::{Gateways, Runtime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting tg-escrow-gateway");

    let store: Arc<dyn Store> = if config.persistence_enabled {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .context("connecting to PostgreSQL")?;
        let store = PostgresStore::new(pool);
        store.migrate().await.context("running migrations")?;
        tracing::info!("using PostgreSQL store");
        Arc::new(store)
    } else {
        tracing::warn!("persistence disabled; state is lost on restart");
        Arc::new(MemoryStore::new())
    };

    let gateways = Gateways::from_config(&config).context("building Telegram gateways")?;
    let runtime = Runtime::start(&config, store, gateways);
    let app = api::build_app(
        runtime.state.clone(),
        config.request_timeout,
        config.internal_routes_enabled,
    );

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "could not listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
        })
        .await?;

    runtime.shutdown();
    Ok(())
}
