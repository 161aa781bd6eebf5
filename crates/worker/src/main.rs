// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod config;
mod consumer;
mod token_client;

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

use authz_core::ids::WorkerId;
use authz_core::lock::PostgresLock;
use authz_core::processor::{MockProcessor, ProcessorAdapter, StripeProcessor};
use authz_core::queue::NatsQueue;
use authz_core::restaurant_config::PostgresRestaurantConfigStore;
use authz_core::store::PostgresEventStore;
use config::WorkerConfig;
use consumer::WorkerContext;
use token_client::HttpTokenClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::parse();
    authz_core::config::init_tracing("authz-worker");

    let pool = PgPoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect(&config.db.database_url)
        .await?;

    let nats_client = async_nats::connect(&config.nats.nats_url).await?;

    let mut processors: HashMap<String, Arc<dyn ProcessorAdapter>> = HashMap::new();
    processors.insert("mock".to_owned(), Arc::new(MockProcessor));
    if let Some(secret_key) = &config.processor_secret_key {
        processors.insert(
            "stripe".to_owned(),
            Arc::new(StripeProcessor::new(config.processor_api_base.clone(), secret_key.clone())),
        );
    }

    let ctx = Arc::new(WorkerContext {
        worker_id: WorkerId::new(),
        store: Arc::new(PostgresEventStore::new(pool.clone())),
        lock: Arc::new(PostgresLock::new(pool.clone())),
        queue: Arc::new(NatsQueue::new(nats_client)),
        token_client: Arc::new(HttpTokenClient::new(
            config.token_store_url.clone(),
            config.token_store_service_auth.clone(),
            config.token_store_service_identity.clone(),
        )),
        restaurant_configs: Arc::new(PostgresRestaurantConfigStore::new(pool)),
        processors,
        lock_ttl: config.lock_ttl(),
        retry_base: config.retry.base_duration(),
        max_retries: config.retry.max_retries,
    });

    let shutdown = CancellationToken::new();
    let handles = consumer::spawn_consumers(ctx, config.consumer_count, config.poll_batch, config.poll_wait(), shutdown.clone());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining in-flight messages");
    shutdown.cancel();
    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}
