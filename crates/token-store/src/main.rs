// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod config;
mod dto;
mod handlers;
mod keys;
mod state;
mod store;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use config::TokenStoreConfig;
use keys::{PartnerKeyRegistry, ServiceKeyRegistry};
use state::AppState;
use store::PostgresTokenStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = TokenStoreConfig::parse();
    authz_core::config::init_tracing("token-store");

    let pool = PgPoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect(&config.db.database_url)
        .await?;

    let api_keys = state::load_api_keys(&config.api_keys_file)?;
    let partner_keys = PartnerKeyRegistry::new(state::load_partner_keys(&config.partner_keys_file)?);

    let mut service_keys_map = match &config.service_keys_file {
        Some(path) => state::load_service_keys(path)?,
        None => std::collections::HashMap::new(),
    };
    let current_key_bytes = hex::decode(&config.primary_encryption_key)?;
    let current_key: [u8; 32] =
        current_key_bytes.try_into().map_err(|_| anyhow::anyhow!("PRIMARY_ENCRYPTION_KEY must be 32 bytes"))?;
    service_keys_map.insert(config.current_key_version, current_key);
    let service_keys = ServiceKeyRegistry::new(config.current_key_version, service_keys_map)?;

    let store = Arc::new(PostgresTokenStore::new(pool));

    let addr = format!("{}:{}", config.host, config.port);
    let app_state = Arc::new(AppState::new(config, store, partner_keys, service_keys, api_keys));

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
    tracing::info!(%addr, "token-store listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        })
        .await?;

    Ok(())
}
