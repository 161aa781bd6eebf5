// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use authz_core::config::{DbConfig, NatsConfig, RetryConfig};

/// Configuration for `authz-relay`, following the teacher's `clap::Args` +
/// `env = "..."` pattern (`MuxConfig`).
#[derive(Debug, Clone, clap::Parser)]
pub struct RelayConfig {
    #[command(flatten)]
    pub db: DbConfig,

    #[command(flatten)]
    pub nats: NatsConfig,

    #[command(flatten)]
    pub retry: RetryConfig,

    /// Fixed interval the relay polls the outbox at when there is nothing
    /// left to do (§4.3 "periodically").
    #[arg(long, default_value_t = 500, env = "PAYAUTH_RELAY_POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    /// Max rows drained per `fetch_ready` call.
    #[arg(long, default_value_t = 100, env = "PAYAUTH_RELAY_BATCH_SIZE")]
    pub batch_size: i64,
}

impl RelayConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
