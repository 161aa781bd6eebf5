use super::*;
use crate::events::{AttemptFailure, AuthorizedResult, DeniedResult, DenialCode};
use crate::ids::EventId;

fn created_event(id: AuthRequestId, seq: i64) -> Event {
    Event {
        event_id: EventId::new(),
        aggregate_id: id,
        sequence_number: seq,
        kind: EventKind::AuthRequestCreated {
            tenant_id: "t1".into(),
            payment_token: "pt_x".into(),
            amount_minor: 5000,
            currency: Currency::USD,
            idempotency_key: "idem-1".into(),
            metadata: serde_json::json!({}),
        },
        correlation_id: None,
        causation_id: None,
        created_at: Utc::now(),
    }
}

fn event(id: AuthRequestId, seq: i64, kind: EventKind) -> Event {
    Event { event_id: EventId::new(), aggregate_id: id, sequence_number: seq, kind, correlation_id: None, causation_id: None, created_at: Utc::now() }
}

#[test]
fn created_event_seeds_pending_state() {
    let id = AuthRequestId::new();
    let state = apply_event(None, &created_event(id, 1));
    assert_eq!(state.status, AuthStatus::Pending);
    assert_eq!(state.latest_applied_sequence, 1);
    assert_eq!(state.amount_minor, 5000);
}

#[test]
fn attempt_started_moves_to_processing() {
    let id = AuthRequestId::new();
    let s0 = apply_event(None, &created_event(id, 1));
    let s1 = apply_event(
        Some(s0),
        &event(id, 2, EventKind::AuthAttemptStarted { restaurant_payment_config_version: 1, attempt_number: 1 }),
    );
    assert_eq!(s1.status, AuthStatus::Processing);
    assert_eq!(s1.latest_applied_sequence, 2);
}

#[test]
fn authorized_response_is_terminal() {
    let id = AuthRequestId::new();
    let s0 = apply_event(None, &created_event(id, 1));
    let s1 = apply_event(
        Some(s0),
        &event(
            id,
            2,
            EventKind::AuthResponseReceived {
                outcome: AuthOutcome::Authorized(AuthorizedResult {
                    processor_name: "mock".into(),
                    processor_auth_id: "auth_1".into(),
                    authorization_code: Some("ABC".into()),
                    authorized_amount_minor: 5000,
                    currency: Currency::USD,
                    authorized_at: Utc::now(),
                    processor_metadata: serde_json::json!({}),
                }),
            },
        ),
    );
    assert!(s1.status.is_terminal());
    assert_eq!(s1.status, AuthStatus::Authorized);
    assert_eq!(s1.processor_auth_id.as_deref(), Some("auth_1"));
}

#[test]
fn denied_response_is_terminal_and_not_an_error() {
    let id = AuthRequestId::new();
    let s0 = apply_event(None, &created_event(id, 1));
    let s1 = apply_event(
        Some(s0),
        &event(
            id,
            2,
            EventKind::AuthResponseReceived {
                outcome: AuthOutcome::Denied(DeniedResult {
                    processor_name: "mock".into(),
                    denial_code: DenialCode::InsufficientFunds,
                    denial_reason: "insufficient_funds".into(),
                    processor_metadata: serde_json::json!({}),
                }),
            },
        ),
    );
    assert_eq!(s1.status, AuthStatus::Denied);
    assert_eq!(s1.denial_reason.as_deref(), Some("insufficient_funds"));
}

#[test]
fn retryable_failure_does_not_advance_past_processing() {
    let id = AuthRequestId::new();
    let s0 = apply_event(None, &created_event(id, 1));
    let s1 = apply_event(
        Some(s0),
        &event(id, 2, EventKind::AuthAttemptStarted { restaurant_payment_config_version: 1, attempt_number: 1 }),
    );
    let s2 = apply_event(
        Some(s1),
        &event(
            id,
            3,
            EventKind::AuthAttemptFailed(AttemptFailure {
                is_retryable: true,
                error_code: "processor_transient".into(),
                error_message: "timeout".into(),
                retry_count: 1,
                next_retry_at: None,
            }),
        ),
    );
    assert_eq!(s2.status, AuthStatus::Processing);
    assert_eq!(s2.retry_count, 1);
}

#[test]
fn max_retries_exceeded_becomes_failed() {
    let id = AuthRequestId::new();
    let s0 = apply_event(None, &created_event(id, 1));
    let s1 = apply_event(
        Some(s0),
        &event(
            id,
            2,
            EventKind::AuthAttemptFailed(AttemptFailure {
                is_retryable: false,
                error_code: "max_retries_exceeded".into(),
                error_message: "exhausted".into(),
                retry_count: 5,
                next_retry_at: None,
            }),
        ),
    );
    assert_eq!(s1.status, AuthStatus::Failed);
}

#[test]
fn authorized_then_voided_transitions() {
    let id = AuthRequestId::new();
    let s0 = apply_event(None, &created_event(id, 1));
    let s1 = apply_event(
        Some(s0),
        &event(
            id,
            2,
            EventKind::AuthResponseReceived {
                outcome: AuthOutcome::Authorized(AuthorizedResult {
                    processor_name: "mock".into(),
                    processor_auth_id: "auth_1".into(),
                    authorization_code: None,
                    authorized_amount_minor: 5000,
                    currency: Currency::USD,
                    authorized_at: Utc::now(),
                    processor_metadata: serde_json::json!({}),
                }),
            },
        ),
    );
    let s2 = apply_event(
        Some(s1),
        &event(id, 3, EventKind::AuthVoidRequested { reason: "customer_request".into(), idempotency_key: "void-1".into() }),
    );
    assert_eq!(s2.status, AuthStatus::Voided);
    assert!(s2.void_requested);
}

#[test]
fn void_before_auth_leaves_pending_flagged_for_worker_race_check() {
    // The worker, not the projection, is responsible for turning a void
    // requested before any response into AuthRequestExpired (§4.5 step 2).
    // The projection only records the flag so the worker can observe it.
    let id = AuthRequestId::new();
    let s0 = apply_event(None, &created_event(id, 1));
    let s1 = apply_event(
        Some(s0),
        &event(id, 2, EventKind::AuthVoidRequested { reason: "customer_request".into(), idempotency_key: "void-1".into() }),
    );
    assert!(s1.void_requested);
    assert_eq!(s1.status, AuthStatus::Pending);
}

#[test]
fn replay_matches_incremental_application() {
    let id = AuthRequestId::new();
    let events = vec![
        created_event(id, 1),
        event(id, 2, EventKind::AuthAttemptStarted { restaurant_payment_config_version: 1, attempt_number: 1 }),
        event(
            id,
            3,
            EventKind::AuthResponseReceived {
                outcome: AuthOutcome::Authorized(AuthorizedResult {
                    processor_name: "mock".into(),
                    processor_auth_id: "auth_1".into(),
                    authorization_code: None,
                    authorized_amount_minor: 5000,
                    currency: Currency::USD,
                    authorized_at: Utc::now(),
                    processor_metadata: serde_json::json!({}),
                }),
            },
        ),
    ];

    let incremental = events.iter().fold(None, |state, event| Some(apply_event(state, event)));
    let replayed = replay(&events);

    assert_eq!(incremental.unwrap().status, replayed.unwrap().status);
}

proptest::proptest! {
    /// Any run of retryable `AuthAttemptFailed` events leaves the
    /// aggregate in `Processing` with `retry_count` and
    /// `latest_applied_sequence` tracking the event list exactly,
    /// regardless of how many attempts were made — the replay-equivalence
    /// invariant in §8 for an arbitrary-length retry history, not just the
    /// three-event example above.
    #[test]
    fn retry_history_of_any_length_tracks_sequence_and_count(attempt_count in 1u32..20) {
        let id = AuthRequestId::new();
        let mut events = vec![created_event(id, 1)];
        for attempt in 1..=attempt_count {
            events.push(event(
                id,
                i64::from(attempt) + 1,
                EventKind::AuthAttemptFailed(AttemptFailure {
                    is_retryable: true,
                    error_code: "processor_transient".into(),
                    error_message: "timeout".into(),
                    retry_count: attempt,
                    next_retry_at: None,
                }),
            ));
        }

        let state = replay(&events).expect("at least the created event is present");
        proptest::prop_assert_eq!(state.status, AuthStatus::Processing);
        proptest::prop_assert_eq!(state.retry_count, attempt_count);
        proptest::prop_assert_eq!(state.latest_applied_sequence, i64::from(attempt_count) + 1);

        let incremental = events.iter().fold(None, |state, event| Some(apply_event(state, event)));
        proptest::prop_assert_eq!(incremental.unwrap().retry_count, state.retry_count);
    }
}
