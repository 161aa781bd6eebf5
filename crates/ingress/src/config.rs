// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use authz_core::config::DbConfig;

/// Configuration for `authz-ingress`, following the teacher's
/// `clap::Args` + `env = "..."` pattern (`MuxConfig`).
#[derive(Debug, Clone, clap::Parser)]
pub struct IngressConfig {
    #[command(flatten)]
    pub db: DbConfig,

    #[arg(long, default_value = "0.0.0.0", env = "PAYAUTH_INGRESS_HOST")]
    pub host: String,

    #[arg(long, default_value_t = 8080, env = "PAYAUTH_INGRESS_PORT")]
    pub port: u16,

    /// Path to a JSON file mapping API key -> tenant id
    /// (`{"sk_live_...": "restaurant_42"}`). Loaded once at startup.
    #[arg(long, env = "PAYAUTH_INGRESS_API_KEYS_FILE")]
    pub api_keys_file: std::path::PathBuf,

    /// Fast-path wait timeout (§4.1), default 5 seconds per the spec.
    #[arg(long, default_value_t = 5000, env = "PAYAUTH_FAST_PATH_WAIT_MS")]
    pub fast_path_wait_ms: u64,
}

impl IngressConfig {
    pub fn fast_path_wait(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.fast_path_wait_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
