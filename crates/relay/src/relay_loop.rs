// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The outbox drain loop (§4.3 Outbox Relay). Scans `OutboxStore` for rows
//! ready to send, converts each row's JSON payload into the matching
//! Protobuf wire message, and publishes it to the queue the authorization
//! worker consumes from.

use std::sync::Arc;

use chrono::Utc;
use prost::Message;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use authz_core::outbox::{next_attempt_backoff, Destination, OutboxRow, OutboxStore};
use authz_core::proto;
use authz_core::queue::{Queue, QueueMessage};

pub struct RelayContext {
    pub outbox: Arc<dyn OutboxStore>,
    pub queue: Arc<dyn Queue>,
    pub retry_base: std::time::Duration,
}

#[derive(Debug, thiserror::Error)]
enum EncodeError {
    #[error("malformed outbox payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct AuthRequestQueuedJson {
    auth_request_id: String,
    tenant_id: String,
    payment_token: String,
    amount_minor: i64,
    currency: String,
    idempotency_key: String,
}

#[derive(Deserialize)]
struct VoidRequestJson {
    auth_request_id: String,
    tenant_id: String,
    reason: String,
    idempotency_key: String,
}

#[derive(Deserialize)]
struct SettlementJson {
    auth_request_id: String,
    tenant_id: String,
    outcome: String,
    amount_minor: i64,
    currency: String,
    processor_name: String,
    processor_auth_id: String,
}

fn build_envelope(row: &OutboxRow) -> Result<proto::EventEnvelope, EncodeError> {
    match row.destination {
        Destination::AuthRequestQueue => {
            let json: AuthRequestQueuedJson = serde_json::from_value(row.payload.clone())?;
            Ok(proto::EventEnvelope {
                event_kind: "AuthRequestQueued".into(),
                payload: Some(proto::event_envelope::Payload::AuthRequestQueued(proto::AuthRequestQueuedMessage {
                    auth_request_id: json.auth_request_id,
                    tenant_id: json.tenant_id,
                    payment_token: json.payment_token,
                    amount_minor: json.amount_minor,
                    currency: json.currency,
                    idempotency_key: json.idempotency_key,
                    outbox_row_id_epoch_millis: row.created_at.timestamp_millis(),
                })),
            })
        }
        Destination::VoidRequestQueue => {
            let json: VoidRequestJson = serde_json::from_value(row.payload.clone())?;
            Ok(proto::EventEnvelope {
                event_kind: "VoidRequest".into(),
                payload: Some(proto::event_envelope::Payload::VoidRequest(proto::VoidRequestMessage {
                    auth_request_id: json.auth_request_id,
                    tenant_id: json.tenant_id,
                    reason: json.reason,
                    idempotency_key: json.idempotency_key,
                })),
            })
        }
        Destination::SettlementNotifications => {
            let json: SettlementJson = serde_json::from_value(row.payload.clone())?;
            Ok(proto::EventEnvelope {
                event_kind: "SettlementNotification".into(),
                payload: Some(proto::event_envelope::Payload::SettlementNotification(
                    proto::SettlementNotificationMessage {
                        auth_request_id: json.auth_request_id,
                        tenant_id: json.tenant_id,
                        outcome: json.outcome,
                        amount_minor: json.amount_minor,
                        currency: json.currency,
                        processor_name: json.processor_name,
                        processor_auth_id: json.processor_auth_id,
                    },
                )),
            })
        }
    }
}

fn encode_message(row: &OutboxRow) -> Result<QueueMessage, EncodeError> {
    let envelope = build_envelope(row)?;
    Ok(QueueMessage {
        dedup_key: row.dedup_key.clone(),
        message_group: row.message_group.clone(),
        payload: envelope.encode_to_vec(),
        receipt_handle: String::new(),
    })
}

async fn process_row(ctx: &RelayContext, row: OutboxRow) {
    let message = match encode_message(&row) {
        Ok(message) => message,
        Err(e) => {
            // A row whose payload doesn't match its own destination's shape
            // can never succeed on retry; mark it processed rather than
            // spin on it forever, the way a dead-letter sink would.
            tracing::error!(outbox_row_id = %row.id, error = %e, "dropping malformed outbox row");
            if let Err(e) = ctx.outbox.mark_processed(row.id).await {
                tracing::error!(outbox_row_id = %row.id, error = %e, "failed to mark malformed row processed");
            }
            return;
        }
    };

    match ctx.queue.publish(row.destination, message).await {
        Ok(()) => {
            if let Err(e) = ctx.outbox.mark_processed(row.id).await {
                tracing::error!(outbox_row_id = %row.id, error = %e, "failed to mark outbox row processed");
            }
        }
        Err(e) => {
            tracing::warn!(outbox_row_id = %row.id, error = %e, "publish failed, scheduling retry");
            let attempt_count = row.attempt_count + 1;
            let delay = next_attempt_backoff(attempt_count, ctx.retry_base);
            let next_attempt_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
            if let Err(e) = ctx.outbox.mark_retry(row.id, attempt_count, next_attempt_at).await {
                tracing::error!(outbox_row_id = %row.id, error = %e, "failed to schedule outbox retry");
            }
        }
    }
}

/// Drain the outbox until `shutdown` fires. Polls every `poll_interval`,
/// except immediately after a full batch — where more rows are likely
/// still waiting — in which case the next scan runs without sleeping
/// (§4.3's "on an in-process wakeup after any insert", approximated here
/// since the relay runs in its own process and cannot observe ingress's
/// or the worker's inserts directly).
pub async fn run(ctx: Arc<RelayContext>, batch_size: i64, poll_interval: std::time::Duration, shutdown: CancellationToken) {
    let mut skip_sleep = false;
    loop {
        if !skip_sleep {
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        } else if shutdown.is_cancelled() {
            break;
        }

        let rows = match ctx.outbox.fetch_ready(batch_size).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "failed to scan outbox");
                skip_sleep = false;
                continue;
            }
        };

        skip_sleep = rows.len() as i64 >= batch_size;
        for row in rows {
            process_row(&ctx, row).await;
        }
    }

    tracing::debug!("outbox relay shutting down");
}

#[cfg(test)]
#[path = "relay_loop_tests.rs"]
mod tests;
