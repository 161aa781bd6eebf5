// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `AuthRequestState` read model and its projection function (§3, §4.2).
//!
//! `apply_event` is a pure function: given the prior state (or `None` for
//! the first event) and the next event, it returns the new state. This is
//! the function replayed by `EventStore::replay` to verify §8's "replaying
//! all events reconstructs an equivalent read model" invariant, and it is
//! the same function called, inside a transaction, by every writer
//! (ingress, worker) immediately after an `Append` succeeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{AuthOutcome, Event, EventKind};
use crate::ids::AuthRequestId;
use crate::money::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthStatus {
    Pending,
    Processing,
    Authorized,
    Denied,
    Failed,
    Expired,
    Voided,
}

impl AuthStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authorized | Self::Denied | Self::Failed | Self::Expired | Self::Voided)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Authorized => "AUTHORIZED",
            Self::Denied => "DENIED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Voided => "VOIDED",
        }
    }
}

/// The materialized current state of one `AuthRequest` aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequestState {
    pub auth_request_id: AuthRequestId,
    pub tenant_id: String,
    pub status: AuthStatus,
    pub latest_applied_sequence: i64,
    pub amount_minor: i64,
    pub currency: Currency,

    pub processor_name: Option<String>,
    pub processor_auth_id: Option<String>,
    pub authorization_code: Option<String>,
    pub authorized_amount_minor: Option<i64>,
    pub denial_code: Option<String>,
    pub denial_reason: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,

    pub void_requested: bool,
    pub void_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuthRequestState {
    /// Construct the initial state from the founding `AuthRequestCreated`
    /// event. Panics (via `debug_assert`) if called with any other kind —
    /// the store guarantees sequence 1 is always `AuthRequestCreated`.
    fn created(event: &Event) -> Self {
        let EventKind::AuthRequestCreated { tenant_id, amount_minor, currency, .. } = &event.kind
        else {
            unreachable!("first event for an aggregate must be AuthRequestCreated")
        };
        Self {
            auth_request_id: event.aggregate_id,
            tenant_id: tenant_id.clone(),
            status: AuthStatus::Pending,
            latest_applied_sequence: event.sequence_number,
            amount_minor: *amount_minor,
            currency: *currency,
            processor_name: None,
            processor_auth_id: None,
            authorization_code: None,
            authorized_amount_minor: None,
            denial_code: None,
            denial_reason: None,
            error_message: None,
            retry_count: 0,
            void_requested: false,
            void_reason: None,
            created_at: event.created_at,
            updated_at: event.created_at,
        }
    }
}

/// Apply one event to the prior state (`None` only for the very first
/// event of an aggregate). Pure and deterministic per §4.2's invariant.
pub fn apply_event(prior: Option<AuthRequestState>, event: &Event) -> AuthRequestState {
    let mut state = match prior {
        Some(s) => s,
        None => return AuthRequestState::created(event),
    };

    state.latest_applied_sequence = event.sequence_number;
    state.updated_at = event.created_at;

    match &event.kind {
        EventKind::AuthRequestCreated { .. } => {
            // Only ever the first event; nothing further to fold.
        }
        EventKind::AuthAttemptStarted { .. } => {
            state.status = AuthStatus::Processing;
        }
        EventKind::AuthResponseReceived { outcome } => match outcome {
            AuthOutcome::Authorized(result) => {
                state.status = AuthStatus::Authorized;
                state.processor_name = Some(result.processor_name.clone());
                state.processor_auth_id = Some(result.processor_auth_id.clone());
                state.authorization_code = result.authorization_code.clone();
                state.authorized_amount_minor = Some(result.authorized_amount_minor);
            }
            AuthOutcome::Denied(result) => {
                state.status = AuthStatus::Denied;
                state.processor_name = Some(result.processor_name.clone());
                state.denial_code = Some(result.denial_code.as_str().to_owned());
                state.denial_reason = Some(result.denial_reason.clone());
            }
        },
        EventKind::AuthAttemptFailed(failure) => {
            state.retry_count = failure.retry_count;
            state.error_message = Some(failure.error_message.clone());
            if !failure.is_retryable {
                state.status = AuthStatus::Failed;
            }
            // Retryable failures do not advance status past PROCESSING.
        }
        EventKind::AuthVoidRequested { reason, .. } => {
            state.void_requested = true;
            state.void_reason = Some(reason.clone());
            if state.status == AuthStatus::Authorized {
                state.status = AuthStatus::Voided;
            }
        }
        EventKind::AuthRequestExpired { reason } => {
            state.status = AuthStatus::Expired;
            state.error_message = Some(reason.clone());
        }
    }

    state
}

/// Fold a full ordered event history into a final state, used by the
/// replay-equivalence test in §8 and by any operator tooling that needs to
/// rebuild a read-model row from scratch.
pub fn replay(events: &[Event]) -> Option<AuthRequestState> {
    events.iter().fold(None, |state, event| Some(apply_event(state, event)))
}

#[cfg(test)]
#[path = "read_model_tests.rs"]
mod tests;
