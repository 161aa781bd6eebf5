// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted state for the Token Store (§4.7, §6): `payment_tokens`,
//! `token_idempotency_keys`, `decrypt_audit_log`. Lives in its own
//! database/pool, separate from the authorization ingress/worker schema,
//! to minimize PCI scope (§6 "Persisted state layout").

use async_trait::async_trait;
use authz_core::idempotency::Fingerprint;
use chrono::{DateTime, Utc};

/// A persisted token. `ciphertext`/`nonce` hold the plaintext re-encrypted
/// under `service_key_version`; the plaintext itself never appears here.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub token_id: String,
    pub restaurant_id: String,
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub service_key_version: i32,
    /// The partner key id, or `"device"` for the hardware-terminal flow —
    /// kept for audit, per §4.7 step 5 "origin key id (for audit)".
    pub origin_key_id: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub expiry_month: Option<i32>,
    pub expiry_year: Option<i32>,
    pub client_metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptAuditOutcome {
    Success,
    Forbidden,
    Expired,
    NotFound,
}

impl DecryptAuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Forbidden => "forbidden",
            Self::Expired => "expired",
            Self::NotFound => "not_found",
        }
    }
}

/// Written on every Decrypt call, success or failure (§4.7 "In all cases
/// ... write a `DecryptAudit` row").
#[derive(Debug, Clone)]
pub struct DecryptAudit {
    pub token_id: String,
    pub requesting_service: String,
    pub correlation_id: Option<String>,
    pub outcome: DecryptAuditOutcome,
}

/// Resolution of a `(restaurant_id, idempotency_key)` lookup against an
/// existing binding, mirroring `authz_core::idempotency::IdempotencyCheck`
/// but typed to an opaque token id rather than `AuthRequestId` (§4.7 step 6).
#[derive(Debug, Clone)]
pub enum TokenIdempotencyCheck {
    Fresh,
    ReplayOf(String),
    Conflict { existing_token_id: String },
}

impl TokenIdempotencyCheck {
    pub fn resolve(existing: Option<(&str, &Fingerprint)>, candidate: &Fingerprint) -> Self {
        match existing {
            None => Self::Fresh,
            Some((token_id, fingerprint)) if fingerprint == candidate => Self::ReplayOf(token_id.to_owned()),
            Some((token_id, _)) => Self::Conflict { existing_token_id: token_id.to_owned() },
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TokenStoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn find_idempotency_binding(
        &self,
        restaurant_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<(String, Fingerprint)>, TokenStoreError>;

    /// Insert a fresh token, and its idempotency binding if one was
    /// supplied, as a single unit (§4.7 step 6).
    async fn insert(
        &self,
        record: TokenRecord,
        idempotency_key: Option<(String, Fingerprint)>,
    ) -> Result<(), TokenStoreError>;

    async fn get(&self, token_id: &str) -> Result<Option<TokenRecord>, TokenStoreError>;

    async fn append_decrypt_audit(&self, audit: DecryptAudit) -> Result<(), TokenStoreError>;
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: std::sync::Mutex<Vec<TokenRecord>>,
    idempotency: std::sync::Mutex<std::collections::HashMap<(String, String), (String, Fingerprint)>>,
    audit_log: std::sync::Mutex<Vec<DecryptAudit>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audit_log_for_test(&self) -> Vec<DecryptAudit> {
        self.audit_log.lock().expect("poisoned mutex").clone()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn find_idempotency_binding(
        &self,
        restaurant_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<(String, Fingerprint)>, TokenStoreError> {
        let bindings =
            self.idempotency.lock().map_err(|_| TokenStoreError::Storage("poisoned mutex".into()))?;
        Ok(bindings.get(&(restaurant_id.to_owned(), idempotency_key.to_owned())).cloned())
    }

    async fn insert(
        &self,
        record: TokenRecord,
        idempotency_key: Option<(String, Fingerprint)>,
    ) -> Result<(), TokenStoreError> {
        if let Some((key, fingerprint)) = idempotency_key {
            let mut bindings =
                self.idempotency.lock().map_err(|_| TokenStoreError::Storage("poisoned mutex".into()))?;
            bindings.insert((record.restaurant_id.clone(), key), (record.token_id.clone(), fingerprint));
        }
        let mut tokens = self.tokens.lock().map_err(|_| TokenStoreError::Storage("poisoned mutex".into()))?;
        tokens.push(record);
        Ok(())
    }

    async fn get(&self, token_id: &str) -> Result<Option<TokenRecord>, TokenStoreError> {
        let tokens = self.tokens.lock().map_err(|_| TokenStoreError::Storage("poisoned mutex".into()))?;
        Ok(tokens.iter().find(|t| t.token_id == token_id).cloned())
    }

    async fn append_decrypt_audit(&self, audit: DecryptAudit) -> Result<(), TokenStoreError> {
        let mut log = self.audit_log.lock().map_err(|_| TokenStoreError::Storage("poisoned mutex".into()))?;
        log.push(audit);
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    token_id: String,
    restaurant_id: String,
    ciphertext: Vec<u8>,
    nonce: Vec<u8>,
    service_key_version: i32,
    origin_key_id: String,
    brand: Option<String>,
    last4: Option<String>,
    expiry_month: Option<i32>,
    expiry_year: Option<i32>,
    client_metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<TokenRow> for TokenRecord {
    fn from(row: TokenRow) -> Self {
        Self {
            token_id: row.token_id,
            restaurant_id: row.restaurant_id,
            ciphertext: row.ciphertext,
            nonce: row.nonce,
            service_key_version: row.service_key_version,
            origin_key_id: row.origin_key_id,
            brand: row.brand,
            last4: row.last4,
            expiry_month: row.expiry_month,
            expiry_year: row.expiry_year,
            client_metadata: row.client_metadata,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

pub struct PostgresTokenStore {
    pool: sqlx::PgPool,
}

impl PostgresTokenStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PostgresTokenStore {
    async fn find_idempotency_binding(
        &self,
        restaurant_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<(String, Fingerprint)>, TokenStoreError> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT token_id, fingerprint FROM token_idempotency_keys WHERE restaurant_id = $1 AND idempotency_key = $2",
        )
        .bind(restaurant_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TokenStoreError::Storage(e.to_string()))?;

        Ok(row.map(|(token_id, fingerprint)| (token_id, Fingerprint::from_stored(fingerprint))))
    }

    async fn insert(
        &self,
        record: TokenRecord,
        idempotency_key: Option<(String, Fingerprint)>,
    ) -> Result<(), TokenStoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| TokenStoreError::Storage(e.to_string()))?;

        sqlx::query(
            "INSERT INTO payment_tokens
                (token_id, restaurant_id, ciphertext, nonce, service_key_version, origin_key_id,
                 brand, last4, expiry_month, expiry_year, client_metadata, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(&record.token_id)
        .bind(&record.restaurant_id)
        .bind(&record.ciphertext)
        .bind(&record.nonce)
        .bind(record.service_key_version)
        .bind(&record.origin_key_id)
        .bind(&record.brand)
        .bind(&record.last4)
        .bind(record.expiry_month)
        .bind(record.expiry_year)
        .bind(&record.client_metadata)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| TokenStoreError::Storage(e.to_string()))?;

        if let Some((key, fingerprint)) = idempotency_key {
            sqlx::query(
                "INSERT INTO token_idempotency_keys (restaurant_id, idempotency_key, token_id, fingerprint, created_at)
                 VALUES ($1, $2, $3, $4, now())",
            )
            .bind(&record.restaurant_id)
            .bind(&key)
            .bind(&record.token_id)
            .bind(fingerprint.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| TokenStoreError::Storage(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| TokenStoreError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, token_id: &str) -> Result<Option<TokenRecord>, TokenStoreError> {
        // A plain tuple would need arity 13 here, past what sqlx's tuple
        // `FromRow` impls cover, hence the dedicated row type.
        let row = sqlx::query_as::<_, TokenRow>(
            "SELECT token_id, restaurant_id, ciphertext, nonce, service_key_version, origin_key_id,
                    brand, last4, expiry_month, expiry_year, client_metadata, created_at, expires_at
             FROM payment_tokens WHERE token_id = $1",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TokenStoreError::Storage(e.to_string()))?;

        Ok(row.map(TokenRecord::from))
    }

    async fn append_decrypt_audit(&self, audit: DecryptAudit) -> Result<(), TokenStoreError> {
        sqlx::query(
            "INSERT INTO decrypt_audit_log (token_id, requesting_service, correlation_id, outcome, occurred_at)
             VALUES ($1, $2, $3, $4, now())",
        )
        .bind(&audit.token_id)
        .bind(&audit.requesting_service)
        .bind(&audit.correlation_id)
        .bind(audit.outcome.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| TokenStoreError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
