// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The queue-consumer loop (§4.5 Authorization Worker): N parallel
//! consumers per process, each running the lock → state-check → attempt →
//! decrypt → authorize → terminal-or-retry pipeline for one message at a
//! time. Generalizes the teacher's `nats_sub::run_subscriber` fan-out
//! subscriber (`crates/mux/src/transport/nats_sub.rs`) into a work-queue
//! consumer: same `tokio::select!` shutdown-vs-work race, but pulling work
//! items one at a time instead of reacting to a broadcast subject.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use prost::Message;
use tokio_util::sync::CancellationToken;

use authz_core::events::{AttemptFailure, AuthOutcome, EventKind};
use authz_core::ids::{AuthRequestId, WorkerId};
use authz_core::lock::{DistributedLock, LockError};
use authz_core::money::Money;
use authz_core::outbox::{next_attempt_backoff, Destination, OutboxInsert};
use authz_core::processor::{AuthorizeCall, ProcessorAdapter, ProcessorOutcome};
use authz_core::proto;
use authz_core::queue::{Queue, QueueMessage};
use authz_core::read_model::AuthRequestState;
use authz_core::restaurant_config::RestaurantConfigStore;
use authz_core::store::EventStore;
use authz_core::token_contract::DecryptReason;

use crate::token_client::{DecryptOutcome, TokenClient};

/// Everything a consumer needs to process one message, shared (`Arc`)
/// across every consumer task in the process.
pub struct WorkerContext {
    pub worker_id: WorkerId,
    pub store: Arc<dyn EventStore>,
    pub lock: Arc<dyn DistributedLock>,
    pub queue: Arc<dyn Queue>,
    pub token_client: Arc<dyn TokenClient>,
    pub restaurant_configs: Arc<dyn RestaurantConfigStore>,
    /// Processor name (§3 RestaurantPaymentConfig's allow-list) -> adapter.
    pub processors: HashMap<String, Arc<dyn ProcessorAdapter>>,
    pub lock_ttl: std::time::Duration,
    pub retry_base: std::time::Duration,
    pub max_retries: u32,
}

/// Spawn `count` consumer tasks, each long-polling `Destination::AuthRequestQueue`
/// until `shutdown` is cancelled (§4.5 "Concurrency": N parallel consumers
/// per process).
pub fn spawn_consumers(
    ctx: Arc<WorkerContext>,
    count: usize,
    poll_batch: usize,
    poll_wait: std::time::Duration,
    shutdown: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..count.max(1))
        .map(|id| {
            let ctx = ctx.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { run_consumer(id, ctx, poll_batch, poll_wait, shutdown).await })
        })
        .collect()
}

async fn run_consumer(
    consumer_id: usize,
    ctx: Arc<WorkerContext>,
    poll_batch: usize,
    poll_wait: std::time::Duration,
    shutdown: CancellationToken,
) {
    tracing::info!(consumer_id, "worker consumer started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            batch = ctx.queue.receive(Destination::AuthRequestQueue, poll_batch, poll_wait) => {
                match batch {
                    Ok(messages) => {
                        for message in messages {
                            handle_message(&ctx, message).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(consumer_id, error = %e, "queue receive failed, backing off");
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                    }
                }
            }
        }
    }
    tracing::info!(consumer_id, "worker consumer stopped");
}

async fn handle_message(ctx: &WorkerContext, message: QueueMessage) {
    let envelope = match proto::EventEnvelope::decode(message.payload.as_slice()) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(error = %e, "failed to decode queue message, dropping");
            return;
        }
    };
    let Some(proto::event_envelope::Payload::AuthRequestQueued(queued)) = envelope.payload else {
        tracing::warn!("auth-request queue message missing AuthRequestQueuedMessage payload, dropping");
        return;
    };
    let Ok(auth_request_id) = AuthRequestId::parse(&queued.auth_request_id) else {
        tracing::error!(raw = %queued.auth_request_id, "unparseable auth_request_id, dropping");
        return;
    };

    process_auth_request(ctx, auth_request_id, queued.tenant_id, queued.payment_token, message).await;
}

/// Runs §4.5 steps 1-6 for one `auth_request_id`. `original` is kept around
/// so a retryable failure can requeue an equivalent message (see
/// `requeue_after_backoff`'s doc comment for why this substitutes for a
/// broker-level visibility timeout).
async fn process_auth_request(
    ctx: &WorkerContext,
    auth_request_id: AuthRequestId,
    tenant_id: String,
    payment_token: String,
    original: QueueMessage,
) {
    // Step 1: lock.
    let handle = match ctx.lock.acquire(auth_request_id, ctx.worker_id, ctx.lock_ttl).await {
        Ok(handle) => handle,
        Err(LockError::AlreadyHeld(_)) => {
            tracing::debug!(%auth_request_id, "lock already held, another worker owns this message");
            return;
        }
        Err(e) => {
            tracing::error!(%auth_request_id, error = %e, "lock acquire failed");
            return;
        }
    };

    let outcome = run_locked(ctx, auth_request_id, &tenant_id, &payment_token, &original).await;

    // Step 6: always release before acking/requeueing.
    if let Err(e) = ctx.lock.release(&handle).await {
        tracing::warn!(%auth_request_id, error = %e, "lock release failed (will self-expire)");
    }

    match outcome {
        MessageOutcome::Ack => {
            let _ = ctx.queue.ack(Destination::AuthRequestQueue, &original.receipt_handle).await;
        }
        MessageOutcome::Retry { delay } => {
            requeue_after_backoff(ctx.queue.clone(), original, delay);
        }
    }
}

enum MessageOutcome {
    Ack,
    Retry { delay: std::time::Duration },
}

async fn run_locked(
    ctx: &WorkerContext,
    auth_request_id: AuthRequestId,
    tenant_id: &str,
    payment_token: &str,
    original: &QueueMessage,
) -> MessageOutcome {
    let state = match ctx.store.load_state(auth_request_id).await {
        Ok(Some(state)) => state,
        Ok(None) => {
            tracing::error!(%auth_request_id, "no read model for a queued auth request, dropping");
            return MessageOutcome::Ack;
        }
        Err(e) => {
            tracing::error!(%auth_request_id, error = %e, "load_state failed, will retry");
            return MessageOutcome::Retry { delay: ctx.retry_base };
        }
    };

    // Step 2: terminal / void-race state check.
    if state.status.is_terminal() {
        return MessageOutcome::Ack;
    }
    if state.void_requested {
        let kind = EventKind::AuthRequestExpired { reason: "void_before_auth".to_owned() };
        if let Err(e) =
            ctx.store.append(auth_request_id, state.latest_applied_sequence, kind, None, None, None, None).await
        {
            tracing::error!(%auth_request_id, error = %e, "failed to append void-race expiry");
            return MessageOutcome::Retry { delay: ctx.retry_base };
        }
        return MessageOutcome::Ack;
    }

    let config = match ctx.restaurant_configs.get(tenant_id).await {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(%auth_request_id, tenant_id, error = %e, "no restaurant payment config");
            return terminal_failure(ctx, auth_request_id, &state, "restaurant_config_not_found", e.to_string()).await;
        }
    };

    // Step 3: start event.
    let attempt_number = state.retry_count + 1;
    let start_kind = EventKind::AuthAttemptStarted {
        restaurant_payment_config_version: config.config_version,
        attempt_number,
    };
    let state = match ctx
        .store
        .append(auth_request_id, state.latest_applied_sequence, start_kind, None, None, None, None)
        .await
    {
        Ok(outcome) => outcome.state,
        Err(e) => {
            tracing::error!(%auth_request_id, error = %e, "failed to append AuthAttemptStarted");
            return MessageOutcome::Retry { delay: ctx.retry_base };
        }
    };

    // Step 4: decrypt.
    let decrypted = match ctx
        .token_client
        .decrypt(auth_request_id, tenant_id, payment_token, DecryptReason::ProcessorAuthorization)
        .await
    {
        DecryptOutcome::Success(payment_data) => payment_data,
        DecryptOutcome::Terminal { error_code } => {
            return terminal_failure(ctx, auth_request_id, &state, &error_code, "token decrypt failed terminally".into())
                .await;
        }
        DecryptOutcome::Retryable { error_code } => {
            return retry_or_fail(ctx, auth_request_id, &state, &error_code, "token decrypt transient error".into())
                .await;
        }
    };

    // Step 5: authorize.
    let Some(processor) = ctx.processors.get(&config.processor_name) else {
        return terminal_failure(
            ctx,
            auth_request_id,
            &state,
            "unknown_processor",
            format!("no processor adapter registered for '{}'", config.processor_name),
        )
        .await;
    };
    let Ok(amount) = Money::new(state.amount_minor, state.currency) else {
        return terminal_failure(ctx, auth_request_id, &state, "invalid_amount", "amount became non-positive".into())
            .await;
    };
    let call = AuthorizeCall {
        auth_request_id: auth_request_id.to_string(),
        decrypted_payment_data: pan_from_decrypted(&decrypted),
        amount,
        // Stable across every retry of the same aggregate so a redelivered
        // attempt can never double-charge at the processor.
        idempotency_key: auth_request_id.to_string(),
    };

    match processor.authorize(call).await {
        Ok(ProcessorOutcome::Authorized(result)) => {
            finish_terminal(ctx, auth_request_id, &state, AuthOutcome::Authorized(result)).await
        }
        Ok(ProcessorOutcome::Denied(result)) => {
            finish_terminal(ctx, auth_request_id, &state, AuthOutcome::Denied(result)).await
        }
        Ok(ProcessorOutcome::Failed { is_retryable: true, error_code, error_message }) => {
            retry_or_fail(ctx, auth_request_id, &state, &error_code, error_message).await
        }
        Ok(ProcessorOutcome::Failed { is_retryable: false, error_code, error_message }) => {
            terminal_failure(ctx, auth_request_id, &state, &error_code, error_message).await
        }
        Err(e) => retry_or_fail(ctx, auth_request_id, &state, "processor_transport", e.to_string()).await,
    }
}

/// Token-store's `Decrypt` response carries the full re-encrypted
/// `PaymentData` JSON object, not a bare PAN (`crates/token-store/src/dto.rs`).
/// Processor adapters key off the card number alone (`MockProcessor`'s
/// test-PAN constants, `StripeProcessor`'s request body), so pull `pan` back
/// out here rather than teaching every adapter the token-store wire shape.
/// Falls back to the raw string for anything that isn't the expected object,
/// which keeps `MockTokenClient`'s bare-PAN echo working unchanged in tests.
fn pan_from_decrypted(decrypted: &str) -> String {
    serde_json::from_str::<serde_json::Value>(decrypted)
        .ok()
        .and_then(|value| value.get("pan").and_then(serde_json::Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| decrypted.to_owned())
}

/// Record the terminal outcome of a successful call (authorized or denied)
/// and target the settlement-notifications destination (§9 decision).
async fn finish_terminal(
    ctx: &WorkerContext,
    auth_request_id: AuthRequestId,
    state: &AuthRequestState,
    outcome: AuthOutcome,
) -> MessageOutcome {
    let (result_status, processor_name, processor_auth_id) = match &outcome {
        AuthOutcome::Authorized(r) => ("authorized", r.processor_name.clone(), r.processor_auth_id.clone()),
        AuthOutcome::Denied(r) => ("denied", r.processor_name.clone(), String::new()),
    };
    let kind = EventKind::AuthResponseReceived { outcome };
    let outbox = settlement_outbox(auth_request_id, state, result_status, &processor_name, &processor_auth_id);
    append_and_settle(ctx, auth_request_id, state, kind, Some(outbox)).await
}

/// Retry rule: append a retryable `AuthAttemptFailed`, or escalate to a
/// terminal one once `retry_count >= max_retries` (§4.5 "Retry rule").
async fn retry_or_fail(
    ctx: &WorkerContext,
    auth_request_id: AuthRequestId,
    state: &AuthRequestState,
    error_code: &str,
    error_message: String,
) -> MessageOutcome {
    let retry_count = state.retry_count + 1;
    if retry_count < ctx.max_retries {
        let delay = next_attempt_backoff(retry_count, ctx.retry_base);
        let next_retry_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        let kind = EventKind::AuthAttemptFailed(AttemptFailure {
            is_retryable: true,
            error_code: error_code.to_owned(),
            error_message,
            retry_count,
            next_retry_at: Some(next_retry_at),
        });
        if let Err(e) =
            ctx.store.append(auth_request_id, state.latest_applied_sequence, kind, None, None, None, None).await
        {
            tracing::error!(%auth_request_id, error = %e, "failed to append retryable AuthAttemptFailed");
        }
        return MessageOutcome::Retry { delay };
    }

    terminal_failure(ctx, auth_request_id, state, "max_retries_exceeded", error_message).await
}

async fn terminal_failure(
    ctx: &WorkerContext,
    auth_request_id: AuthRequestId,
    state: &AuthRequestState,
    error_code: &str,
    error_message: String,
) -> MessageOutcome {
    let retry_count = state.retry_count + 1;
    let kind = EventKind::AuthAttemptFailed(AttemptFailure {
        is_retryable: false,
        error_code: error_code.to_owned(),
        error_message,
        retry_count,
        next_retry_at: None,
    });
    let outbox = settlement_outbox(auth_request_id, state, "failed", "", "");
    append_and_settle(ctx, auth_request_id, state, kind, Some(outbox)).await
}

async fn append_and_settle(
    ctx: &WorkerContext,
    auth_request_id: AuthRequestId,
    state: &AuthRequestState,
    kind: EventKind,
    outbox: Option<OutboxInsert>,
) -> MessageOutcome {
    match ctx.store.append(auth_request_id, state.latest_applied_sequence, kind, None, None, outbox, None).await {
        Ok(_) => MessageOutcome::Ack,
        Err(e) => {
            tracing::error!(%auth_request_id, error = %e, "failed to append terminal event");
            MessageOutcome::Retry { delay: ctx.retry_base }
        }
    }
}

fn settlement_outbox(
    auth_request_id: AuthRequestId,
    state: &AuthRequestState,
    outcome: &str,
    processor_name: &str,
    processor_auth_id: &str,
) -> OutboxInsert {
    OutboxInsert {
        destination: Destination::SettlementNotifications,
        message_group: auth_request_id.to_string(),
        payload: serde_json::json!({
            "auth_request_id": auth_request_id.to_string(),
            "tenant_id": state.tenant_id,
            "outcome": outcome,
            "amount_minor": state.amount_minor,
            "currency": state.currency.code(),
            "processor_name": processor_name,
            "processor_auth_id": processor_auth_id,
        }),
    }
}

/// The `Queue` trait has no broker-level nak/visibility-timeout primitive
/// (`ack` is the only acknowledgement hook), so a retryable failure is
/// handled by the worker itself republishing an equivalent message after
/// `delay` rather than relying on redelivery. The requeued message gets a
/// fresh dedup key — it is a deliberate internal retry, not a duplicate
/// delivery the broker's dedup window should suppress.
fn requeue_after_backoff(queue: Arc<dyn Queue>, original: QueueMessage, delay: std::time::Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let retry_message = QueueMessage {
            dedup_key: format!("retry:{}:{}", original.message_group, uuid::Uuid::new_v4()),
            message_group: original.message_group.clone(),
            payload: original.payload.clone(),
            receipt_handle: String::new(),
        };
        if let Err(e) = queue.publish(Destination::AuthRequestQueue, retry_message).await {
            tracing::error!(error = %e, "failed to requeue message for retry");
        }
    });
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
