// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod config;
mod dto;
mod handlers;
mod state;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use authz_core::store::PostgresEventStore;
use config::IngressConfig;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = IngressConfig::parse();
    authz_core::config::init_tracing("authz-ingress");

    let pool = PgPoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect(&config.db.database_url)
        .await?;

    let api_keys = state::load_api_keys(&config.api_keys_file)?;
    let store = Arc::new(PostgresEventStore::new(pool.clone()));
    let idempotency = Arc::new(authz_core::idempotency::PostgresIdempotencyStore::new(pool));

    let addr = format!("{}:{}", config.host, config.port);
    let app_state = Arc::new(AppState::new(config, store, idempotency, api_keys));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received, draining in-flight requests");
            shutdown.cancel();
        }
    });

    let router = transport::build_router(app_state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "authz-ingress listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        })
        .await?;

    Ok(())
}
