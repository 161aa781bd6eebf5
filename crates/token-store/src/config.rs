// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration for `token-store`, following the teacher's `clap::Args`
//! + `env = "..."` pattern (`MuxConfig`). Deliberately does not flatten
//! `authz_core::config::DbConfig` — the Token Store owns a separate
//! database from ingress/worker/relay (§6, PCI scope minimization).

/// Connection configuration for the Token Store's own database.
#[derive(Debug, Clone, clap::Args)]
pub struct TokenStoreDbConfig {
    #[arg(long, env = "PAYAUTH_TOKEN_STORE_DATABASE_URL")]
    pub database_url: String,

    #[arg(long, default_value_t = 10, env = "PAYAUTH_TOKEN_STORE_DB_MAX_CONNECTIONS")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, clap::Parser)]
pub struct TokenStoreConfig {
    #[command(flatten)]
    pub db: TokenStoreDbConfig,

    #[arg(long, default_value = "0.0.0.0", env = "PAYAUTH_TOKEN_STORE_HOST")]
    pub host: String,

    #[arg(long, default_value_t = 8090, env = "PAYAUTH_TOKEN_STORE_PORT")]
    pub port: u16,

    /// Path to a JSON file mapping API key -> restaurant id, same shape as
    /// ingress's `api_keys_file` (§4.7 Create/Get are client-facing).
    #[arg(long, env = "PAYAUTH_TOKEN_STORE_API_KEYS_FILE")]
    pub api_keys_file: std::path::PathBuf,

    /// Path to a JSON file listing the partner/device key material used to
    /// decrypt what a client sends on Create: `{"key_id": "<hex32>", ...}`.
    #[arg(long, env = "PAYAUTH_TOKEN_STORE_PARTNER_KEYS_FILE")]
    pub partner_keys_file: std::path::PathBuf,

    /// Hex-encoded 32-byte service key for the current version, used to
    /// re-encrypt tokens for storage (§4.7 "Key rotation").
    #[arg(long, env = "PAYAUTH_TOKEN_STORE_PRIMARY_ENCRYPTION_KEY")]
    pub primary_encryption_key: String,

    #[arg(long, default_value_t = 1, env = "PAYAUTH_TOKEN_STORE_CURRENT_KEY_VERSION")]
    pub current_key_version: i32,

    /// Path to a JSON file listing retired service key versions still
    /// needed to decrypt older tokens: `{"1": "<hex32>", ...}`. The
    /// current version is added to this set automatically.
    #[arg(long, env = "PAYAUTH_TOKEN_STORE_SERVICE_KEYS_FILE")]
    pub service_keys_file: Option<std::path::PathBuf>,

    /// Shared secret that internal callers (the worker) must present as
    /// `X-Service-Auth` on Decrypt, matching `PAYAUTH_TOKEN_STORE_SERVICE_AUTH`
    /// already used by `authz-worker`'s `HttpTokenClient`.
    #[arg(long, env = "PAYAUTH_TOKEN_STORE_SERVICE_AUTH")]
    pub service_auth_secret: String,

    /// Comma-separated list of service identities allowed to call Decrypt
    /// (§4.7 "restricted to an allow-list of known internal services").
    #[arg(long, value_delimiter = ',', env = "PAYAUTH_TOKEN_STORE_ALLOWED_SERVICES")]
    pub allowed_services: Vec<String>,

    #[arg(long, default_value_t = 24 * 90, env = "PAYAUTH_TOKEN_STORE_TOKEN_TTL_HOURS")]
    pub token_ttl_hours: i64,
}

impl TokenStoreConfig {
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
