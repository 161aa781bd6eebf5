// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The append-only event log's event kinds and payloads (§3 Event, §4.2 EL).
//!
//! Each event carries a typed payload; the payload is serialized to JSON for
//! storage (`payment_events.payload` is a `jsonb` column) so the schema can
//! evolve additively without a migration per new field, while the Rust side
//! keeps full type safety via `#[serde(tag = "kind")]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AuthRequestId, EventId};
use crate::money::{Currency, Money};

/// A single event in an aggregate's history. Immutable once inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub aggregate_id: AuthRequestId,
    pub sequence_number: i64,
    pub kind: EventKind,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Denial reason codes surfaced by the processor adapter (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialCode {
    GenericDecline,
    InsufficientFunds,
    ExpiredCard,
    IncorrectCvc,
    Fraudulent,
    AuthenticationRequired,
}

impl DenialCode {
    /// The wire value (`#[serde(rename_all = "snake_case")]` above), for
    /// call sites that need the string without a `serde_json` round trip.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenericDecline => "generic_decline",
            Self::InsufficientFunds => "insufficient_funds",
            Self::ExpiredCard => "expired_card",
            Self::IncorrectCvc => "incorrect_cvc",
            Self::Fraudulent => "fraudulent",
            Self::AuthenticationRequired => "authentication_required",
        }
    }
}

/// Terminal vs. retryable classification recorded on `AuthAttemptFailed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub is_retryable: bool,
    pub error_code: String,
    pub error_message: String,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Successful authorization result, structurally identical regardless of
/// which concrete processor produced it (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedResult {
    pub processor_name: String,
    pub processor_auth_id: String,
    pub authorization_code: Option<String>,
    pub authorized_amount_minor: i64,
    pub currency: Currency,
    pub authorized_at: DateTime<Utc>,
    pub processor_metadata: serde_json::Value,
}

/// Business decline result (§4.6) — not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeniedResult {
    pub processor_name: String,
    pub denial_code: DenialCode,
    pub denial_reason: String,
    pub processor_metadata: serde_json::Value,
}

/// The event kinds named in §3. Tagged so the stored JSON is self-describing
/// and the projection (`read_model::apply_event`) can match exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventKind {
    AuthRequestCreated {
        tenant_id: String,
        payment_token: String,
        amount_minor: i64,
        currency: Currency,
        idempotency_key: String,
        metadata: serde_json::Value,
    },
    AuthAttemptStarted {
        restaurant_payment_config_version: i32,
        attempt_number: u32,
    },
    AuthResponseReceived {
        outcome: AuthOutcome,
    },
    AuthAttemptFailed(AttemptFailure),
    AuthVoidRequested {
        reason: String,
        idempotency_key: String,
    },
    AuthRequestExpired {
        reason: String,
    },
}

/// The two terminal shapes `AuthResponseReceived` can carry (§4.5 step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum AuthOutcome {
    Authorized(AuthorizedResult),
    Denied(DeniedResult),
}

impl Money {
    /// Convenience constructor used when folding `AuthRequestCreated`.
    pub fn from_minor_and_currency(amount_minor: i64, currency: Currency) -> Self {
        Self { amount_minor, currency }
    }
}

impl EventKind {
    /// A short discriminant name, used for logging and for the dead-letter
    /// / queue message envelope (`proto::EventEnvelope.kind`).
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthRequestCreated { .. } => "AuthRequestCreated",
            Self::AuthAttemptStarted { .. } => "AuthAttemptStarted",
            Self::AuthResponseReceived { .. } => "AuthResponseReceived",
            Self::AuthAttemptFailed(_) => "AuthAttemptFailed",
            Self::AuthVoidRequested { .. } => "AuthVoidRequested",
            Self::AuthRequestExpired { .. } => "AuthRequestExpired",
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
