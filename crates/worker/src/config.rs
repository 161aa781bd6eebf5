// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use authz_core::config::{DbConfig, NatsConfig, RetryConfig};

/// Configuration for `authz-worker`, following the teacher's
/// `clap::Args` + `env = "..."` pattern (`MuxConfig`).
#[derive(Debug, Clone, clap::Parser)]
pub struct WorkerConfig {
    #[command(flatten)]
    pub db: DbConfig,

    #[command(flatten)]
    pub nats: NatsConfig,

    #[command(flatten)]
    pub retry: RetryConfig,

    /// Number of consumer tasks polling the auth-request queue in parallel
    /// (§4.5 "Concurrency").
    #[arg(long, default_value_t = 4, env = "PAYAUTH_WORKER_CONSUMER_COUNT")]
    pub consumer_count: usize,

    /// Processing lock TTL; must exceed the worker's maximum expected
    /// processor latency plus one retry window (§4.4 "Recovery").
    #[arg(long, default_value_t = 30, env = "PAYAUTH_WORKER_LOCK_TTL_SECS")]
    pub lock_ttl_secs: u64,

    /// Base URL of the token-store service (§4.7).
    #[arg(long, env = "PAYAUTH_TOKEN_STORE_URL")]
    pub token_store_url: String,

    /// Shared secret sent as `X-Service-Auth` on every token-store call
    /// (§4.7 Decrypt's "out-of-band authenticated" service identity).
    #[arg(long, env = "PAYAUTH_TOKEN_STORE_SERVICE_AUTH")]
    pub token_store_service_auth: String,

    /// This worker's identity, sent as `X-Service-Identity` and checked by
    /// the token store against its allow-list of permitted consumers
    /// (§4.7 Decrypt).
    #[arg(long, default_value = "authz-worker", env = "PAYAUTH_TOKEN_STORE_SERVICE_IDENTITY")]
    pub token_store_service_identity: String,

    /// Base URL for the `stripe` processor adapter; ignored for `mock`.
    #[arg(long, default_value = "https://api.stripe.com", env = "PAYAUTH_PROCESSOR_API_BASE")]
    pub processor_api_base: String,

    /// Secret key for the `stripe` processor adapter; ignored for `mock`.
    #[arg(long, env = "PAYAUTH_PROCESSOR_SECRET_KEY")]
    pub processor_secret_key: Option<String>,

    /// How long a consumer's `Queue::receive` long-polls before returning
    /// an empty batch.
    #[arg(long, default_value_t = 5000, env = "PAYAUTH_WORKER_POLL_WAIT_MS")]
    pub poll_wait_ms: u64,

    /// Max messages pulled per `Queue::receive` call, per consumer.
    #[arg(long, default_value_t = 10, env = "PAYAUTH_WORKER_POLL_BATCH")]
    pub poll_batch: usize,
}

impl WorkerConfig {
    pub fn lock_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn poll_wait(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_wait_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
