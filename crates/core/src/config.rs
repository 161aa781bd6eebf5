// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration fragments shared by every service binary, following the
//! teacher's `clap::Args` + `env = "..."` pattern (`crates/mux/src/config.rs`)
//! so each binary's own config can `#[command(flatten)]` these in.

/// Database connection configuration, shared by `authz-ingress`,
/// `authz-worker`, and `authz-relay` (all three share one pool/database).
/// `token-store` deliberately does NOT flatten this — it has its own
/// `TokenStoreDbConfig` pointed at a separate database (§6 persisted state
/// layout, PCI scope minimization).
#[derive(Debug, Clone, clap::Args)]
pub struct DbConfig {
    /// Postgres connection string for the authorization database.
    #[arg(long, env = "PAYAUTH_DATABASE_URL")]
    pub database_url: String,

    /// Max connections in the pool.
    #[arg(long, default_value_t = 10, env = "PAYAUTH_DB_MAX_CONNECTIONS")]
    pub max_connections: u32,
}

/// NATS connection configuration, shared by `authz-relay` (publisher) and
/// `authz-worker` (consumer).
#[derive(Debug, Clone, clap::Args)]
pub struct NatsConfig {
    #[arg(long, default_value = "nats://127.0.0.1:4222", env = "PAYAUTH_NATS_URL")]
    pub nats_url: String,
}

/// Retry/backoff tuning shared by the outbox relay and the worker's
/// processor-retry rule (§4.3, §4.5), so both curves are configured the
/// same way even though they retry different things.
#[derive(Debug, Clone, clap::Args)]
pub struct RetryConfig {
    #[arg(long, default_value_t = 5, env = "PAYAUTH_MAX_RETRIES")]
    pub max_retries: u32,

    #[arg(long, default_value_t = 200, env = "PAYAUTH_RETRY_BASE_MS")]
    pub retry_base_ms: u64,
}

impl RetryConfig {
    pub fn base_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_base_ms)
    }
}

/// Tracing/logging setup shared by every binary (§10 Ambient Stack). Each
/// `main.rs` calls this before anything else so a startup failure before
/// the subscriber is installed still gets a readable message on stderr.
pub fn init_tracing(service_name: &'static str) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json().with_target(true))
        .init();

    tracing::info!(service = service_name, "tracing initialized");
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
