// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The transactional outbox (§3 OutboxRow, §4.3 Outbox Relay).
//!
//! A row is inserted in the same database transaction as the event it
//! notifies about (see `store::EventStore::append`), so an event can never
//! be recorded without a corresponding outbox row, and vice versa. The
//! relay (`authz-relay`) is the only component that reads and updates these
//! rows; ingress and worker only ever insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ids::OutboxRowId;

/// Logical destination queues. `AuthRequestQueue` carries per-aggregate FIFO
/// ordering; the others are best-effort / non-ordered per §9's decision on
/// where `AuthAttemptStarted` and terminal outcomes are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Destination {
    AuthRequestQueue,
    VoidRequestQueue,
    SettlementNotifications,
}

impl Destination {
    pub fn topic_name(&self) -> &'static str {
        match self {
            Self::AuthRequestQueue => "payment-auth-requests.fifo",
            Self::VoidRequestQueue => "payment-void-requests",
            Self::SettlementNotifications => "payment-settlement-notifications",
        }
    }

    /// Whether this destination requires per-group FIFO ordering.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::AuthRequestQueue)
    }
}

/// What a writer (ingress, worker) hands to `EventStore::append` to insert
/// an outbox row in the same transaction as the event.
#[derive(Debug, Clone)]
pub struct OutboxInsert {
    pub destination: Destination,
    pub message_group: String,
    pub payload: serde_json::Value,
}

/// A row as persisted. `dedup_key` defaults to the row id, which is stable
/// and unique even across redelivery (§4.3 step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRow {
    pub id: OutboxRowId,
    pub destination: Destination,
    pub message_group: String,
    pub dedup_key: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub next_attempt_at: DateTime<Utc>,
}

impl OutboxRow {
    pub fn dedup_key_for(id: OutboxRowId) -> String {
        id.to_string()
    }
}

/// Exponential backoff with full jitter, per §4.3's "exponential backoff"
/// requirement. Mirrors the retry shaping used by the authorization
/// worker's processor-retry rule (§4.5) so both backoff curves read the
/// same way in logs.
pub fn next_attempt_backoff(attempt_count: u32, base: std::time::Duration) -> std::time::Duration {
    let capped = attempt_count.min(8);
    let max_millis = base.as_millis().saturating_mul(1u128 << capped).min(60_000);
    let jittered = rand::rng().random_range(0..=max_millis.max(1));
    std::time::Duration::from_millis(jittered as u64)
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum OutboxStoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Abstracts the relay's view of the `outbox` table: scan for ready rows,
/// mark success, or reschedule on failure (§4.3). Ingress and worker never
/// use this trait — they only ever insert, through `EventStore::append`.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn fetch_ready(&self, batch_size: i64) -> Result<Vec<OutboxRow>, OutboxStoreError>;

    async fn mark_processed(&self, id: OutboxRowId) -> Result<(), OutboxStoreError>;

    async fn mark_retry(
        &self,
        id: OutboxRowId,
        attempt_count: u32,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), OutboxStoreError>;
}

/// In-memory `OutboxStore` for relay unit tests (§10 testing conventions).
#[derive(Default)]
pub struct InMemoryOutboxStore {
    rows: std::sync::Mutex<Vec<OutboxRow>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row directly, standing in for what `EventStore::append` would
    /// have inserted transactionally in a real backend.
    pub fn push_for_test(&self, row: OutboxRow) {
        self.rows.lock().expect("poisoned mutex").push(row);
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn fetch_ready(&self, batch_size: i64) -> Result<Vec<OutboxRow>, OutboxStoreError> {
        let rows = self.rows.lock().map_err(|_| OutboxStoreError::Storage("poisoned mutex".into()))?;
        let now = Utc::now();
        Ok(rows
            .iter()
            .filter(|r| r.processed_at.is_none() && r.next_attempt_at <= now)
            .take(batch_size.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, id: OutboxRowId) -> Result<(), OutboxStoreError> {
        let mut rows = self.rows.lock().map_err(|_| OutboxStoreError::Storage("poisoned mutex".into()))?;
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: OutboxRowId,
        attempt_count: u32,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), OutboxStoreError> {
        let mut rows = self.rows.lock().map_err(|_| OutboxStoreError::Storage("poisoned mutex".into()))?;
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.attempt_count = attempt_count;
            row.next_attempt_at = next_attempt_at;
        }
        Ok(())
    }
}

/// Postgres-backed `OutboxStore` reading/updating the same `outbox` table
/// `PostgresEventStore::append` inserts into.
pub struct PostgresOutboxStore {
    pool: sqlx::PgPool,
}

impl PostgresOutboxStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    fn destination_from_topic(topic: &str) -> Option<Destination> {
        match topic {
            "payment-auth-requests.fifo" => Some(Destination::AuthRequestQueue),
            "payment-void-requests" => Some(Destination::VoidRequestQueue),
            "payment-settlement-notifications" => Some(Destination::SettlementNotifications),
            _ => None,
        }
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn fetch_ready(&self, batch_size: i64) -> Result<Vec<OutboxRow>, OutboxStoreError> {
        let rows = sqlx::query_as::<_, (uuid::Uuid, String, String, String, serde_json::Value, DateTime<Utc>, Option<DateTime<Utc>>, i32, DateTime<Utc>)>(
            "SELECT id, destination, message_group, dedup_key, payload, created_at, processed_at, attempt_count, next_attempt_at
             FROM outbox WHERE processed_at IS NULL AND next_attempt_at <= now()
             ORDER BY created_at ASC LIMIT $1",
        )
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OutboxStoreError::Storage(e.to_string()))?;

        rows.into_iter()
            .filter_map(|(id, destination, message_group, dedup_key, payload, created_at, processed_at, attempt_count, next_attempt_at)| {
                Self::destination_from_topic(&destination).map(|destination| {
                    Ok(OutboxRow {
                        id: id.into(),
                        destination,
                        message_group,
                        dedup_key,
                        payload,
                        created_at,
                        processed_at,
                        attempt_count: attempt_count as u32,
                        next_attempt_at,
                    })
                })
            })
            .collect()
    }

    async fn mark_processed(&self, id: OutboxRowId) -> Result<(), OutboxStoreError> {
        sqlx::query("UPDATE outbox SET processed_at = now() WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| OutboxStoreError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: OutboxRowId,
        attempt_count: u32,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), OutboxStoreError> {
        sqlx::query("UPDATE outbox SET attempt_count = $1, next_attempt_at = $2 WHERE id = $3")
            .bind(attempt_count as i32)
            .bind(next_attempt_at)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| OutboxStoreError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "outbox_tests.rs"]
mod tests;
