// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `RestaurantPaymentConfig` (§3) — per-tenant processor selection and
//! processing policy, consulted by the worker before every processor call
//! (§4.5 step 3's "effective `restaurant_payment_config_version`", §4.6).

use async_trait::async_trait;

/// Per-tenant payment configuration. `processor_name` must match a key the
/// worker's processor registry was built with; an unknown name is a
/// worker-side terminal failure rather than a panic, since new tenants can
/// be provisioned with a processor the running worker binary doesn't yet
/// know about.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RestaurantPaymentConfig {
    pub tenant_id: String,
    pub processor_name: String,
    pub config_version: i32,
    pub statement_descriptor: String,
    /// §9 Open Question (b) decision: whether an ambiguous invalid-request
    /// error from the processor is treated as retryable. Defaults to `true`
    /// (retry), matching most processors' own guidance to retry
    /// idempotently on ambiguous errors.
    pub retry_ambiguous_invalid_request: bool,
    pub metadata: serde_json::Value,
}

impl RestaurantPaymentConfig {
    /// A config pointing at the deterministic mock processor, used for
    /// tenants that have not been explicitly provisioned yet (local dev,
    /// and any test tenant created only via an API key mapping).
    pub fn mock_default(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            processor_name: "mock".to_owned(),
            config_version: 1,
            statement_descriptor: "PAYAUTH".to_owned(),
            retry_ambiguous_invalid_request: true,
            metadata: serde_json::json!({}),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RestaurantConfigError {
    #[error("no payment config provisioned for tenant {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Abstracts the `restaurant_payment_configs` table (§6 persisted state
/// layout) behind a trait so the worker can be unit-tested without a live
/// Postgres instance (§10 testing conventions).
#[async_trait]
pub trait RestaurantConfigStore: Send + Sync {
    async fn get(&self, tenant_id: &str) -> Result<RestaurantPaymentConfig, RestaurantConfigError>;
}

/// In-memory `RestaurantConfigStore` for unit tests and local dev. Falls
/// back to `RestaurantPaymentConfig::mock_default` for any tenant not
/// explicitly provisioned, so local dev works without a seeding step.
#[derive(Default)]
pub struct InMemoryRestaurantConfigStore {
    configs: std::sync::Mutex<std::collections::HashMap<String, RestaurantPaymentConfig>>,
}

impl InMemoryRestaurantConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_for_test(&self, config: RestaurantPaymentConfig) {
        self.configs.lock().expect("poisoned mutex").insert(config.tenant_id.clone(), config);
    }
}

#[async_trait]
impl RestaurantConfigStore for InMemoryRestaurantConfigStore {
    async fn get(&self, tenant_id: &str) -> Result<RestaurantPaymentConfig, RestaurantConfigError> {
        let configs = self.configs.lock().map_err(|_| RestaurantConfigError::Storage("poisoned mutex".into()))?;
        Ok(configs.get(tenant_id).cloned().unwrap_or_else(|| RestaurantPaymentConfig::mock_default(tenant_id)))
    }
}

/// Postgres-backed `RestaurantConfigStore` over `restaurant_payment_configs`.
/// Unlike the in-memory fake, an unprovisioned tenant is a hard
/// `NotFound` — production tenants are provisioned out of band before
/// their first authorization request.
pub struct PostgresRestaurantConfigStore {
    pool: sqlx::PgPool,
}

impl PostgresRestaurantConfigStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RestaurantConfigStore for PostgresRestaurantConfigStore {
    async fn get(&self, tenant_id: &str) -> Result<RestaurantPaymentConfig, RestaurantConfigError> {
        let row = sqlx::query_as::<_, (String, String, i32, String, bool, serde_json::Value)>(
            "SELECT tenant_id, processor_name, config_version, statement_descriptor,
                    retry_ambiguous_invalid_request, metadata
             FROM restaurant_payment_configs WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RestaurantConfigError::Storage(e.to_string()))?;

        let (tenant_id, processor_name, config_version, statement_descriptor, retry_ambiguous_invalid_request, metadata) =
            row.ok_or_else(|| RestaurantConfigError::NotFound(tenant_id.to_owned()))?;

        Ok(RestaurantPaymentConfig {
            tenant_id,
            processor_name,
            config_version,
            statement_descriptor,
            retry_ambiguous_invalid_request,
            metadata,
        })
    }
}

#[cfg(test)]
#[path = "restaurant_config_tests.rs"]
mod tests;
