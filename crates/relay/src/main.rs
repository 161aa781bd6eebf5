// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod config;
mod relay_loop;

use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

use authz_core::outbox::PostgresOutboxStore;
use authz_core::queue::NatsQueue;
use config::RelayConfig;
use relay_loop::RelayContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::parse();
    authz_core::config::init_tracing("authz-relay");

    let pool = PgPoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect(&config.db.database_url)
        .await?;

    let nats_client = async_nats::connect(&config.nats.nats_url).await?;

    let ctx = Arc::new(RelayContext {
        outbox: Arc::new(PostgresOutboxStore::new(pool)),
        queue: Arc::new(NatsQueue::new(nats_client)),
        retry_base: config.retry.base_duration(),
    });

    let shutdown = CancellationToken::new();
    let drain_shutdown = shutdown.clone();
    let handle = tokio::spawn(relay_loop::run(ctx, config.batch_size, config.poll_interval(), drain_shutdown));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining in-flight outbox rows");
    shutdown.cancel();
    let _ = handle.await;

    Ok(())
}
