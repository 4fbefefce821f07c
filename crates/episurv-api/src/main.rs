//! EpiSurv API Server
//!
//! Loads configuration, migrates the database, optionally seeds the first
//! admin account, and serves the API until Ctrl-C.

use anyhow::Context;
use episurv_api::{
    auth::{purge_period, spawn_purge_task},
    create_router,
    state::AppState,
};
use episurv_core::config::AppConfig;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("EPISURV_CONFIG") {
        Ok(path) => AppConfig::from_file(&path)
            .with_context(|| format!("Failed to read config file {path}"))?
            .with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "episurv_api={level},audit={level},tower_http={level}",
            level = config.logging.level
        )
        .into()
    });

    if config.logging.json_format {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config);

    let pool = PgPoolOptions::new()
        .max_connections(config.database.pool_size)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .connect(&config.database.postgres_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let purge_interval = purge_period(&config.auth);
    let bootstrap_password = config.auth.bootstrap_admin_password.clone();

    let state = Arc::new(AppState::new(config, pool.clone()));

    if let Some(password) = bootstrap_password {
        if state.auth.seed_admin(&password).await? {
            tracing::info!("Seeded bootstrap admin account");
        } else {
            tracing::debug!("Admin account already present, bootstrap skipped");
        }
    }

    if !state.enforce_sessions() {
        tracing::warn!("Session enforcement is off; logout does not invalidate tokens");
    }

    let purge = match purge_interval {
        Some(period) => Some(spawn_purge_task(state.sessions.clone(), period)),
        None => {
            tracing::info!("Expired-session purge disabled");
            None
        }
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("EpiSurv API Server starting on http://{}", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(purge) = purge {
        purge.abort();
    }
    pool.close().await;
    tracing::info!("Server stopped");

    Ok(())
}
