//! Consulta gateway - main application entry point.
//!
//! A lookup proxy that puts every inbound query through an admission
//! pipeline (credential validation, quota accounting, input validation,
//! replay/flood/injection heuristics, response cache) before touching
//! the upstream data API, and records every decision in an audit log.
//!
//! # Architecture
//!
//! - **Web framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (keys, cache, audit log)
//! - **Abuse state**: in-process ledger (nonces, fingerprints, flood counters)
//! - **Format**: JSON requests/responses
//!
//! # Startup flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Build the router: public lookup surface + admin-gated management surface
//! 4. Spawn the periodic maintenance sweep
//! 5. Start the server on the configured port

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod security;
mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::{
    security::anti_replay::{InMemoryLedger, SecurityLedger},
    services::upstream::UpstreamClient,
};

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: db::DbPool,
    pub config: Arc<config::Config>,
    pub ledger: Arc<SecurityLedger>,
    pub upstream: UpstreamClient,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(config::Config::from_env()?);
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let ledger = Arc::new(SecurityLedger::new(
        Arc::new(InMemoryLedger::new()),
        config.nonce_ttl_ms,
        config.flood_threshold,
    ));

    let upstream = UpstreamClient::new(&config.external_api_url, config.upstream_timeout_ms)?;

    let state = AppState {
        pool: pool.clone(),
        config: config.clone(),
        ledger: ledger.clone(),
        upstream,
    };

    // Admin management surface, gated by the master key
    let admin_routes = Router::new()
        .route("/api/admin/keys", post(handlers::admin_keys::create_key))
        .route("/api/admin/keys", get(handlers::admin_keys::list_keys))
        .route(
            "/api/admin/keys/{id}",
            patch(handlers::admin_keys::toggle_key),
        )
        .route(
            "/api/admin/keys/{id}",
            delete(handlers::admin_keys::delete_key),
        )
        .route(
            "/api/admin/security",
            get(handlers::admin_security::security_report),
        )
        .route(
            "/api/admin/security",
            post(handlers::admin_security::maintenance),
        )
        .route("/api/admin/logs", get(handlers::admin_logs::list_logs))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admin::admin_middleware,
        ));

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/consultas", get(handlers::consultas::consultar))
        .route("/api/auth/validate", post(handlers::auth::validate))
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Periodic maintenance: expired nonces/fingerprints/flood counters
    // and expired cache rows, decoupled from the request path
    let sweep_pool = pool.clone();
    let sweep_ledger = ledger.clone();
    let sweep_interval = config.sweep_interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(sweep_interval));
        loop {
            interval.tick().await;
            let swept = sweep_ledger.sweep_expired();
            match services::cache_service::sweep_expired(&sweep_pool).await {
                Ok(removed) => {
                    tracing::debug!("maintenance sweep: {swept} ledger records, {removed} cache rows")
                }
                Err(e) => tracing::error!("cache sweep failed: {e}"),
            }
        }
    });

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
