// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The event store (§3 Event, §4.2 Event Log + Projections).
//!
//! `EventStore::append` is the sole write path for every aggregate mutation
//! in the system: it is a compare-and-swap on `sequence_number`, and on
//! success it folds the new event onto the prior read model and persists
//! both the event row and the updated read-model row — plus an optional
//! outbox row — in one database transaction (§4.2's "Append contract" and
//! "Outbox contract").

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::idempotency::{IdempotencyBinding, IdempotencyInsert, IdempotencyStore, IdempotencyStoreError};
use crate::ids::{AuthRequestId, EventId};
use crate::outbox::OutboxInsert;
use crate::read_model::{apply_event, AuthRequestState};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("expected sequence {expected} for {aggregate_id}, but another writer already appended at that position")]
    SequenceConflict { aggregate_id: AuthRequestId, expected: i64 },
    #[error("aggregate {0} has no events")]
    NotFound(AuthRequestId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// The result of a successful `append`: the event as persisted, and the
/// read model folded forward to include it.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub event: Event,
    pub state: AuthRequestState,
}

/// Abstracts `payment_events` + `auth_request_state` + `outbox` behind a
/// trait so ingress and worker logic can be unit-tested against
/// `InMemoryEventStore` without a live Postgres instance (§10 testing).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append `kind` as the event immediately following `expected_sequence`
    /// for `aggregate_id`. `expected_sequence = 0` means "this must be the
    /// first event". If `outbox` is `Some`, the row is inserted in the same
    /// transaction as the event and the read-model upsert. If `idempotency`
    /// is `Some`, the binding is inserted in that same transaction too
    /// (§4.1 step "On fresh request", sub-step d) — a binding can never be
    /// recorded without the event it guards.
    async fn append(
        &self,
        aggregate_id: AuthRequestId,
        expected_sequence: i64,
        kind: EventKind,
        correlation_id: Option<String>,
        causation_id: Option<String>,
        outbox: Option<OutboxInsert>,
        idempotency: Option<IdempotencyInsert>,
    ) -> Result<AppendOutcome, StoreError>;

    async fn load_events(&self, aggregate_id: AuthRequestId) -> Result<Vec<Event>, StoreError>;

    async fn load_state(&self, aggregate_id: AuthRequestId) -> Result<Option<AuthRequestState>, StoreError>;
}

/// In-memory `EventStore` for unit tests. Not crash-safe and not shared
/// across processes; exists purely so handler/worker logic can be tested
/// without `DATABASE_URL`.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: std::sync::Mutex<std::collections::HashMap<AuthRequestId, Vec<Event>>>,
    states: std::sync::Mutex<std::collections::HashMap<AuthRequestId, AuthRequestState>>,
    /// Outbox rows accumulated for test assertions; a real relay never
    /// reads this, only `outbox::PostgresOutboxStore` does.
    pub outbox_inserts: std::sync::Mutex<Vec<(AuthRequestId, OutboxInsert)>>,
    /// Idempotency bindings accumulated for test assertions.
    pub idempotency_inserts: std::sync::Mutex<Vec<(AuthRequestId, IdempotencyInsert)>>,
    /// Real bindings by `(tenant, idempotency_key)`, so this store can also
    /// serve as its own `IdempotencyStore` in tests and single-process demo
    /// wiring, the way `PostgresEventStore` and `PostgresIdempotencyStore`
    /// share one underlying table in production.
    bindings: std::sync::Mutex<std::collections::HashMap<(String, String), IdempotencyBinding>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        aggregate_id: AuthRequestId,
        expected_sequence: i64,
        kind: EventKind,
        correlation_id: Option<String>,
        causation_id: Option<String>,
        outbox: Option<OutboxInsert>,
        idempotency: Option<IdempotencyInsert>,
    ) -> Result<AppendOutcome, StoreError> {
        let mut events = self.events.lock().map_err(|_| StoreError::Storage("poisoned mutex".into()))?;
        let history = events.entry(aggregate_id).or_default();

        let current_sequence = history.last().map(|e| e.sequence_number).unwrap_or(0);
        if current_sequence != expected_sequence {
            return Err(StoreError::SequenceConflict { aggregate_id, expected: expected_sequence });
        }

        let event = Event {
            event_id: EventId::new(),
            aggregate_id,
            sequence_number: expected_sequence + 1,
            kind,
            correlation_id,
            causation_id,
            created_at: chrono::Utc::now(),
        };
        history.push(event.clone());

        let mut states = self.states.lock().map_err(|_| StoreError::Storage("poisoned mutex".into()))?;
        let prior = states.get(&aggregate_id).cloned();
        let state = apply_event(prior, &event);
        states.insert(aggregate_id, state.clone());
        drop(states);
        drop(events);

        if let Some(insert) = outbox {
            let mut inserts = self.outbox_inserts.lock().map_err(|_| StoreError::Storage("poisoned mutex".into()))?;
            inserts.push((aggregate_id, insert));
        }

        if let Some(insert) = idempotency {
            let now = chrono::Utc::now();
            let expires_at = now
                + chrono::Duration::from_std(insert.ttl)
                    .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut bindings = self.bindings.lock().map_err(|_| StoreError::Storage("poisoned mutex".into()))?;
            bindings.entry((insert.tenant_id.clone(), insert.idempotency_key.clone())).or_insert(IdempotencyBinding {
                tenant_id: insert.tenant_id.clone(),
                idempotency_key: insert.idempotency_key.clone(),
                bound_id: aggregate_id,
                fingerprint: insert.fingerprint.clone(),
                created_at: now,
                expires_at,
            });
            drop(bindings);

            let mut inserts =
                self.idempotency_inserts.lock().map_err(|_| StoreError::Storage("poisoned mutex".into()))?;
            inserts.push((aggregate_id, insert));
        }

        Ok(AppendOutcome { event, state })
    }

    async fn load_events(&self, aggregate_id: AuthRequestId) -> Result<Vec<Event>, StoreError> {
        let events = self.events.lock().map_err(|_| StoreError::Storage("poisoned mutex".into()))?;
        Ok(events.get(&aggregate_id).cloned().unwrap_or_default())
    }

    async fn load_state(&self, aggregate_id: AuthRequestId) -> Result<Option<AuthRequestState>, StoreError> {
        let states = self.states.lock().map_err(|_| StoreError::Storage("poisoned mutex".into()))?;
        Ok(states.get(&aggregate_id).cloned())
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryEventStore {
    async fn find(
        &self,
        tenant_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<IdempotencyBinding>, IdempotencyStoreError> {
        let bindings = self.bindings.lock().map_err(|_| IdempotencyStoreError::Storage("poisoned mutex".into()))?;
        Ok(bindings.get(&(tenant_id.to_owned(), idempotency_key.to_owned())).cloned())
    }
}

/// Postgres-backed `EventStore`. The CAS is enforced by a unique index on
/// `(aggregate_id, sequence_number)`: a concurrent writer's insert at the
/// same sequence fails with a unique-violation, which we turn back into
/// `StoreError::SequenceConflict` without ever needing a `SELECT ... FOR
/// UPDATE` (mirrors the teacher's unit-of-work-over-one-transaction shape).
pub struct PostgresEventStore {
    pool: sqlx::PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_state(tx: &mut sqlx::PgConnection, aggregate_id: AuthRequestId) -> Result<Option<AuthRequestState>, StoreError> {
        let events = sqlx::query_as::<_, (uuid::Uuid, i64, serde_json::Value, chrono::DateTime<chrono::Utc>)>(
            "SELECT event_id, sequence_number, payload, created_at
             FROM payment_events WHERE aggregate_id = $1 ORDER BY sequence_number",
        )
        .bind(aggregate_id.0)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        let mut state = None;
        for (event_id, sequence_number, payload, created_at) in events {
            let kind: EventKind =
                serde_json::from_value(payload).map_err(|e| StoreError::Storage(e.to_string()))?;
            let event = Event {
                event_id: event_id.into(),
                aggregate_id,
                sequence_number,
                kind,
                correlation_id: None,
                causation_id: None,
                created_at,
            };
            state = Some(apply_event(state, &event));
        }
        Ok(state)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(
        &self,
        aggregate_id: AuthRequestId,
        expected_sequence: i64,
        kind: EventKind,
        correlation_id: Option<String>,
        causation_id: Option<String>,
        outbox: Option<OutboxInsert>,
        idempotency: Option<IdempotencyInsert>,
    ) -> Result<AppendOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| StoreError::Storage(e.to_string()))?;

        let event_id = EventId::new();
        let sequence_number = expected_sequence + 1;
        let payload = serde_json::to_value(&kind).map_err(|e| StoreError::Storage(e.to_string()))?;

        let insert = sqlx::query(
            "INSERT INTO payment_events (event_id, aggregate_id, sequence_number, kind, payload, correlation_id, causation_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, now())",
        )
        .bind(event_id.0)
        .bind(aggregate_id.0)
        .bind(sequence_number)
        .bind(kind.name())
        .bind(&payload)
        .bind(&correlation_id)
        .bind(&causation_id)
        .execute(&mut *tx)
        .await;

        if let Err(sqlx::Error::Database(db_err)) = &insert {
            if db_err.is_unique_violation() {
                tx.rollback().await.map_err(|e| StoreError::Storage(e.to_string()))?;
                return Err(StoreError::SequenceConflict { aggregate_id, expected: expected_sequence });
            }
        }
        insert.map_err(|e| StoreError::Storage(e.to_string()))?;

        let created_at = sqlx::query_scalar::<_, chrono::DateTime<chrono::Utc>>(
            "SELECT created_at FROM payment_events WHERE event_id = $1",
        )
        .bind(event_id.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        let event = Event { event_id, aggregate_id, sequence_number, kind, correlation_id, causation_id, created_at };

        // Re-reads the full history including the row just inserted above,
        // so the fold already reflects `event` without a separate prior+apply step.
        let state = Self::fetch_state(&mut tx, aggregate_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(aggregate_id))?;

        sqlx::query(
            "INSERT INTO auth_request_state (auth_request_id, tenant_id, status, latest_applied_sequence, amount_minor, currency,
                processor_name, processor_auth_id, authorization_code, authorized_amount_minor, denial_code, denial_reason,
                error_message, retry_count, void_requested, void_reason, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
             ON CONFLICT (auth_request_id) DO UPDATE SET
                status = EXCLUDED.status,
                latest_applied_sequence = EXCLUDED.latest_applied_sequence,
                processor_name = EXCLUDED.processor_name,
                processor_auth_id = EXCLUDED.processor_auth_id,
                authorization_code = EXCLUDED.authorization_code,
                authorized_amount_minor = EXCLUDED.authorized_amount_minor,
                denial_code = EXCLUDED.denial_code,
                denial_reason = EXCLUDED.denial_reason,
                error_message = EXCLUDED.error_message,
                retry_count = EXCLUDED.retry_count,
                void_requested = EXCLUDED.void_requested,
                void_reason = EXCLUDED.void_reason,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(state.auth_request_id.0)
        .bind(&state.tenant_id)
        .bind(state.status.as_str())
        .bind(state.latest_applied_sequence)
        .bind(state.amount_minor)
        .bind(state.currency.code())
        .bind(&state.processor_name)
        .bind(&state.processor_auth_id)
        .bind(&state.authorization_code)
        .bind(state.authorized_amount_minor)
        .bind(&state.denial_code)
        .bind(&state.denial_reason)
        .bind(&state.error_message)
        .bind(state.retry_count as i32)
        .bind(state.void_requested)
        .bind(&state.void_reason)
        .bind(state.created_at)
        .bind(state.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        if let Some(insert) = outbox {
            let dedup_key = crate::outbox::OutboxRow::dedup_key_for(crate::ids::OutboxRowId::new());
            sqlx::query(
                "INSERT INTO outbox (id, destination, message_group, dedup_key, payload, created_at, attempt_count, next_attempt_at)
                 VALUES (gen_random_uuid(), $1, $2, $3, $4, now(), 0, now())",
            )
            .bind(insert.destination.topic_name())
            .bind(&insert.message_group)
            .bind(&dedup_key)
            .bind(&insert.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        }

        if let Some(insert) = idempotency {
            let expires_at = event.created_at
                + chrono::Duration::from_std(insert.ttl).map_err(|e| StoreError::Storage(e.to_string()))?;
            sqlx::query(
                "INSERT INTO auth_idempotency_keys (tenant_id, idempotency_key, bound_id, fingerprint, created_at, expires_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (tenant_id, idempotency_key) DO NOTHING",
            )
            .bind(&insert.tenant_id)
            .bind(&insert.idempotency_key)
            .bind(aggregate_id.0)
            .bind(insert.fingerprint.as_str())
            .bind(event.created_at)
            .bind(expires_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(AppendOutcome { event, state })
    }

    async fn load_events(&self, aggregate_id: AuthRequestId) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query_as::<_, (uuid::Uuid, i64, serde_json::Value, chrono::DateTime<chrono::Utc>)>(
            "SELECT event_id, sequence_number, payload, created_at
             FROM payment_events WHERE aggregate_id = $1 ORDER BY sequence_number",
        )
        .bind(aggregate_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;

        rows.into_iter()
            .map(|(event_id, sequence_number, payload, created_at)| {
                let kind: EventKind =
                    serde_json::from_value(payload).map_err(|e| StoreError::Storage(e.to_string()))?;
                Ok(Event { event_id: event_id.into(), aggregate_id, sequence_number, kind, correlation_id: None, causation_id: None, created_at })
            })
            .collect()
    }

    async fn load_state(&self, aggregate_id: AuthRequestId) -> Result<Option<AuthRequestState>, StoreError> {
        let events = self.load_events(aggregate_id).await?;
        if events.is_empty() {
            return Ok(None);
        }
        Ok(crate::read_model::replay(&events))
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
