// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Distributed lock manager (§3 ProcessingLock, §4.5 step 1).
//!
//! One lock per `auth_request_id` serializes concurrent worker attempts
//! (duplicate queue delivery, a manual retry racing a redelivery) so that
//! only one holder is ever inside the processor call at a time. Acquire and
//! renew are both compare-and-swap-on-expiry: a lock is free to acquire
//! either because no row exists yet or because `expires_at` has already
//! passed, the same shape as the teacher's credential-broker holder slot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ids::{AuthRequestId, WorkerId};

#[derive(Debug, Clone, thiserror::Error)]
pub enum LockError {
    #[error("lock for {0} is held by another worker")]
    AlreadyHeld(AuthRequestId),
    #[error("lock for {0} is not held by this worker (fencing check failed)")]
    FencingMismatch(AuthRequestId),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy)]
pub struct LockHandle {
    pub auth_request_id: AuthRequestId,
    pub holder: WorkerId,
    pub fence_token: i64,
    pub expires_at: DateTime<Utc>,
}

/// Abstracts the `auth_processing_locks` table behind a trait so the worker
/// can be unit-tested against an in-memory fake (§10 testing conventions).
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Acquire the lock if it is free (no row, or `expires_at` in the
    /// past). Returns `LockError::AlreadyHeld` if another worker holds it.
    async fn acquire(
        &self,
        auth_request_id: AuthRequestId,
        holder: WorkerId,
        ttl: std::time::Duration,
    ) -> Result<LockHandle, LockError>;

    /// Extend the expiry of a lock this worker still holds. Fails with
    /// `FencingMismatch` if the lock has since been reassigned (e.g. this
    /// worker stalled past the TTL and another worker took over).
    async fn renew(&self, handle: &LockHandle, ttl: std::time::Duration) -> Result<LockHandle, LockError>;

    /// Release a held lock. Best-effort: callers proceed regardless of
    /// whether release succeeds, since expiry reclaims it either way.
    async fn release(&self, handle: &LockHandle) -> Result<(), LockError>;
}

/// In-memory `DistributedLock` for unit tests and single-process dev runs.
#[derive(Default)]
pub struct InMemoryLock {
    rows: std::sync::Mutex<std::collections::HashMap<AuthRequestId, (WorkerId, i64, DateTime<Utc>)>>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for InMemoryLock {
    async fn acquire(
        &self,
        auth_request_id: AuthRequestId,
        holder: WorkerId,
        ttl: std::time::Duration,
    ) -> Result<LockHandle, LockError> {
        let mut rows = self.rows.lock().map_err(|_| LockError::Storage("poisoned mutex".into()))?;
        let now = Utc::now();
        if let Some((_, _, expires_at)) = rows.get(&auth_request_id) {
            if *expires_at > now {
                return Err(LockError::AlreadyHeld(auth_request_id));
            }
        }
        let fence_token = rows.get(&auth_request_id).map(|(_, t, _)| t + 1).unwrap_or(1);
        let expires_at = now + chrono::Duration::from_std(ttl).map_err(|e| LockError::Storage(e.to_string()))?;
        rows.insert(auth_request_id, (holder, fence_token, expires_at));
        Ok(LockHandle { auth_request_id, holder, fence_token, expires_at })
    }

    async fn renew(&self, handle: &LockHandle, ttl: std::time::Duration) -> Result<LockHandle, LockError> {
        let mut rows = self.rows.lock().map_err(|_| LockError::Storage("poisoned mutex".into()))?;
        match rows.get(&handle.auth_request_id) {
            Some((holder, fence_token, _)) if *holder == handle.holder && *fence_token == handle.fence_token => {
                let expires_at =
                    Utc::now() + chrono::Duration::from_std(ttl).map_err(|e| LockError::Storage(e.to_string()))?;
                rows.insert(handle.auth_request_id, (handle.holder, handle.fence_token, expires_at));
                Ok(LockHandle { expires_at, ..*handle })
            }
            _ => Err(LockError::FencingMismatch(handle.auth_request_id)),
        }
    }

    async fn release(&self, handle: &LockHandle) -> Result<(), LockError> {
        let mut rows = self.rows.lock().map_err(|_| LockError::Storage("poisoned mutex".into()))?;
        if let Some((holder, fence_token, _)) = rows.get(&handle.auth_request_id) {
            if *holder == handle.holder && *fence_token == handle.fence_token {
                rows.remove(&handle.auth_request_id);
            }
        }
        Ok(())
    }
}

/// Postgres-backed `DistributedLock` over `auth_processing_locks`.
///
/// `acquire` uses a single `INSERT ... ON CONFLICT (auth_request_id) DO
/// UPDATE ... WHERE auth_processing_locks.expires_at < now()` so the
/// compare-and-swap is atomic without a separate read.
pub struct PostgresLock {
    pool: sqlx::PgPool,
}

impl PostgresLock {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DistributedLock for PostgresLock {
    async fn acquire(
        &self,
        auth_request_id: AuthRequestId,
        holder: WorkerId,
        ttl: std::time::Duration,
    ) -> Result<LockHandle, LockError> {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).map_err(|e| LockError::Storage(e.to_string()))?;
        let row = sqlx::query_as::<_, (i64, chrono::DateTime<Utc>)>(
            r#"
            INSERT INTO auth_processing_locks (auth_request_id, holder_id, fence_token, expires_at)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (auth_request_id) DO UPDATE
                SET holder_id = EXCLUDED.holder_id,
                    fence_token = auth_processing_locks.fence_token + 1,
                    expires_at = EXCLUDED.expires_at
                WHERE auth_processing_locks.expires_at < now()
            RETURNING fence_token, expires_at
            "#,
        )
        .bind(auth_request_id.0)
        .bind(holder.0)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LockError::Storage(e.to_string()))?;

        match row {
            Some((fence_token, expires_at)) => Ok(LockHandle { auth_request_id, holder, fence_token, expires_at }),
            None => Err(LockError::AlreadyHeld(auth_request_id)),
        }
    }

    async fn renew(&self, handle: &LockHandle, ttl: std::time::Duration) -> Result<LockHandle, LockError> {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).map_err(|e| LockError::Storage(e.to_string()))?;
        let updated = sqlx::query(
            r#"
            UPDATE auth_processing_locks
            SET expires_at = $1
            WHERE auth_request_id = $2 AND holder_id = $3 AND fence_token = $4
            "#,
        )
        .bind(expires_at)
        .bind(handle.auth_request_id.0)
        .bind(handle.holder.0)
        .bind(handle.fence_token)
        .execute(&self.pool)
        .await
        .map_err(|e| LockError::Storage(e.to_string()))?;

        if updated.rows_affected() == 0 {
            return Err(LockError::FencingMismatch(handle.auth_request_id));
        }
        Ok(LockHandle { expires_at, ..*handle })
    }

    async fn release(&self, handle: &LockHandle) -> Result<(), LockError> {
        sqlx::query(
            r#"
            DELETE FROM auth_processing_locks
            WHERE auth_request_id = $1 AND holder_id = $2 AND fence_token = $3
            "#,
        )
        .bind(handle.auth_request_id.0)
        .bind(handle.holder.0)
        .bind(handle.fence_token)
        .execute(&self.pool)
        .await
        .map_err(|e| LockError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
