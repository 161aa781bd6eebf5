// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotency key binding and request fingerprinting (§3 IdempotencyKey).
//!
//! A fingerprint is a stable hash of the semantic fields of a request —
//! never its idempotency key or any timing/identifier metadata — so that
//! two calls with the same `(tenant, idempotency_key)` but materially
//! different bodies are rejected as a conflict (§7) instead of silently
//! returning whichever one happened to win the race.

use sha2::{Digest, Sha256};

use crate::ids::AuthRequestId;

/// A hex-encoded SHA-256 fingerprint of a request's semantic fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fields must be serialized in a caller-fixed order; callers should
    /// never depend on struct field order since that is not part of any
    /// stability contract.
    pub fn compute(fields: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for field in fields {
            hasher.update(field.as_bytes());
            hasher.update(b"\x1f"); // unit separator, avoids "ab"+"c" == "a"+"bc" collisions
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reconstruct a fingerprint read back from storage. Only for callers
    /// persisting their own `(key, fingerprint)` bindings outside this
    /// module (e.g. the Token Store's idempotency table) — never for
    /// computing a fresh fingerprint to compare against.
    pub fn from_stored(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted idempotency binding (§3 IdempotencyKey).
#[derive(Debug, Clone)]
pub struct IdempotencyBinding {
    pub tenant_id: String,
    pub idempotency_key: String,
    pub bound_id: AuthRequestId,
    pub fingerprint: Fingerprint,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// The outcome of checking an idempotency key against the store, before any
/// write happens. Mirrors §4.1 step "Idempotency" and §7's conflict rule.
#[derive(Debug, Clone)]
pub enum IdempotencyCheck {
    /// No binding exists yet; proceed with the fresh-request path.
    Fresh,
    /// A binding exists and the fingerprint matches; return the bound id
    /// with no new side effects.
    ReplayOf(AuthRequestId),
    /// A binding exists but the fingerprint differs: the caller retried the
    /// same key with a materially different request body.
    Conflict { bound_id: AuthRequestId },
}

impl IdempotencyCheck {
    /// Resolve what the caller should do, given any existing binding found
    /// for `(tenant, idempotency_key)` and the candidate request's own
    /// fingerprint.
    pub fn resolve(existing: Option<&IdempotencyBinding>, candidate_fingerprint: &Fingerprint) -> Self {
        match existing {
            None => Self::Fresh,
            Some(binding) if binding.fingerprint == *candidate_fingerprint => Self::ReplayOf(binding.bound_id),
            Some(binding) => Self::Conflict { bound_id: binding.bound_id },
        }
    }
}

/// What a writer hands to `EventStore::append` to bind an idempotency key
/// in the same transaction as the event it is guarding (§4.1 step "On
/// fresh request", sub-step d).
#[derive(Debug, Clone)]
pub struct IdempotencyInsert {
    pub tenant_id: String,
    pub idempotency_key: String,
    pub fingerprint: Fingerprint,
    pub ttl: std::time::Duration,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum IdempotencyStoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Read-only lookup used before a write to decide fresh/replay/conflict
/// (§4.1). The bind itself always happens inside `EventStore::append`'s
/// transaction, never through this trait, so a binding can never be
/// recorded without the event it guards.
#[async_trait::async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn find(
        &self,
        tenant_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<IdempotencyBinding>, IdempotencyStoreError>;
}

#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    bindings: std::sync::Mutex<std::collections::HashMap<(String, String), IdempotencyBinding>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/worker-side helper mirroring what `EventStore::append` would
    /// have persisted transactionally in a real backend.
    pub fn insert_for_test(&self, binding: IdempotencyBinding) {
        let mut bindings = self.bindings.lock().expect("poisoned mutex");
        bindings.insert((binding.tenant_id.clone(), binding.idempotency_key.clone()), binding);
    }
}

#[async_trait::async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn find(
        &self,
        tenant_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<IdempotencyBinding>, IdempotencyStoreError> {
        let bindings = self.bindings.lock().map_err(|_| IdempotencyStoreError::Storage("poisoned mutex".into()))?;
        Ok(bindings.get(&(tenant_id.to_owned(), idempotency_key.to_owned())).cloned())
    }
}

pub struct PostgresIdempotencyStore {
    pool: sqlx::PgPool,
}

impl PostgresIdempotencyStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl IdempotencyStore for PostgresIdempotencyStore {
    async fn find(
        &self,
        tenant_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<IdempotencyBinding>, IdempotencyStoreError> {
        let row = sqlx::query_as::<_, (String, String, uuid::Uuid, String, chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)>(
            "SELECT tenant_id, idempotency_key, bound_id, fingerprint, created_at, expires_at
             FROM auth_idempotency_keys WHERE tenant_id = $1 AND idempotency_key = $2",
        )
        .bind(tenant_id)
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IdempotencyStoreError::Storage(e.to_string()))?;

        Ok(row.map(|(tenant_id, idempotency_key, bound_id, fingerprint, created_at, expires_at)| IdempotencyBinding {
            tenant_id,
            idempotency_key,
            bound_id: bound_id.into(),
            fingerprint: Fingerprint(fingerprint),
            created_at,
            expires_at,
        }))
    }
}

#[cfg(test)]
#[path = "idempotency_tests.rs"]
mod tests;
