// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the authorization ingress surface (§4.1, §6).
//!
//! The fast path (`wait_for_fast_path`) is implemented as a bounded poll of
//! the shared read-model store rather than an in-process wakeup channel:
//! ingress and the worker that actually completes the request are separate
//! processes with no shared memory, so only the database they both write
//! to can carry the signal.

use std::sync::Arc;

use authz_core::error::AppErrorResponse;
use authz_core::events::EventKind;
use authz_core::idempotency::{Fingerprint, IdempotencyCheck, IdempotencyInsert};
use authz_core::ids::AuthRequestId;
use authz_core::money::Currency;
use authz_core::outbox::{Destination, OutboxInsert};
use authz_core::read_model::AuthRequestState;
use authz_core::AppError;
use axum::extract::{Json, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::dto::{AuthorizeRequest, AuthorizeResponse, GetAuthStatusResponse, VoidAuthRequest, VoidAuthResponse};
use crate::state::AppState;
use crate::transport::auth::resolve_tenant;

const DEFAULT_IDEMPOTENCY_TTL: std::time::Duration = std::time::Duration::from_secs(7 * 24 * 3600);

/// How often the fast path re-checks the read model while waiting for a
/// terminal status (§4.1). Short enough that the common-case win shows up
/// as a near-immediate 200, long enough not to hammer the pool.
const FAST_PATH_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);

/// Poll `store.load_state` until `auth_request_id` reaches a terminal
/// status or `state.config.fast_path_wait()` elapses (§4.1 "bounded-latency
/// fast path"). The worker (or, for a multi-process deployment, the worker
/// process entirely) advances the read model by appending events against
/// the same database this polls, so this is the cross-process-safe
/// replacement for a purely in-process wakeup: it works whether the worker
/// that finishes the request is this process or another one entirely.
async fn wait_for_fast_path(
    state: &AppState,
    auth_request_id: AuthRequestId,
    initial: AuthRequestState,
) -> AuthRequestState {
    if initial.status.is_terminal() {
        return initial;
    }
    let deadline = tokio::time::Instant::now() + state.config.fast_path_wait();
    let mut latest = initial;
    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(FAST_PATH_POLL_INTERVAL).await;
        match state.store.load_state(auth_request_id).await {
            Ok(Some(found)) => {
                latest = found;
                if latest.status.is_terminal() {
                    return latest;
                }
            }
            Ok(None) => tracing::error!(%auth_request_id, "fast-path poll found no read model for a just-created request"),
            Err(e) => tracing::warn!(%auth_request_id, error = %e, "fast-path poll failed, retrying until deadline"),
        }
    }
    latest
}

fn status_url(auth_request_id: AuthRequestId) -> String {
    format!("/v1/authorize/{auth_request_id}/status")
}

/// `POST /v1/authorize` (§4.1, §6).
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AuthorizeRequest>,
) -> Response {
    let tenant_id = match resolve_tenant(&headers, &state) {
        Ok(tenant) => tenant.to_owned(),
        Err(err) => return AppErrorResponse::from(err).into_response(),
    };

    if req.amount_minor <= 0 {
        return AppErrorResponse::from(AppError::Validation)
            .into_response();
    }
    let Some(currency) = Currency::from_code(&req.currency) else {
        return AppErrorResponse::from(AppError::Validation).into_response();
    };
    if req.idempotency_key.trim().is_empty() {
        return AppErrorResponse::from(AppError::Validation).into_response();
    }

    let fingerprint = Fingerprint::compute(&[
        &tenant_id,
        &req.payment_token,
        &req.amount_minor.to_string(),
        currency.code(),
    ]);

    let existing = match state.idempotency.find(&tenant_id, &req.idempotency_key).await {
        Ok(existing) => existing,
        Err(e) => return AppErrorResponse::internal(e).into_response(),
    };

    match IdempotencyCheck::resolve(existing.as_ref(), &fingerprint) {
        IdempotencyCheck::Conflict { .. } => {
            return AppErrorResponse::from(AppError::IdempotencyConflict).into_response();
        }
        IdempotencyCheck::ReplayOf(bound_id) => {
            return match state.store.load_state(bound_id).await {
                Ok(Some(existing_state)) => {
                    Json(AuthorizeResponse::from_state(&existing_state, || status_url(bound_id))).into_response()
                }
                Ok(None) => AppErrorResponse::internal("idempotency binding referenced an unknown aggregate")
                    .into_response(),
                Err(e) => AppErrorResponse::internal(e).into_response(),
            };
        }
        IdempotencyCheck::Fresh => {}
    }

    let auth_request_id = AuthRequestId::new();

    let outbox = OutboxInsert {
        destination: Destination::AuthRequestQueue,
        message_group: auth_request_id.to_string(),
        payload: serde_json::json!({
            "auth_request_id": auth_request_id.to_string(),
            "tenant_id": tenant_id,
            "payment_token": req.payment_token,
            "amount_minor": req.amount_minor,
            "currency": currency.code(),
            "idempotency_key": req.idempotency_key,
        }),
    };
    let idempotency = IdempotencyInsert {
        tenant_id: tenant_id.clone(),
        idempotency_key: req.idempotency_key.clone(),
        fingerprint,
        ttl: DEFAULT_IDEMPOTENCY_TTL,
    };

    let kind = EventKind::AuthRequestCreated {
        tenant_id: tenant_id.clone(),
        payment_token: req.payment_token,
        amount_minor: req.amount_minor,
        currency,
        idempotency_key: req.idempotency_key,
        metadata: req.metadata,
    };

    let outcome = match state.store.append(auth_request_id, 0, kind, None, None, Some(outbox), Some(idempotency)).await
    {
        Ok(outcome) => outcome,
        Err(e) => return AppErrorResponse::internal(e).into_response(),
    };

    let final_state = wait_for_fast_path(&state, auth_request_id, outcome.state).await;
    Json(AuthorizeResponse::from_state(&final_state, || status_url(auth_request_id))).into_response()
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub restaurant_id: String,
}

/// `GET /v1/authorize/{id}/status?restaurant_id=…` (§4.1, §6).
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Response {
    let tenant_id = match resolve_tenant(&headers, &state) {
        Ok(tenant) => tenant,
        Err(err) => return AppErrorResponse::from(err).into_response(),
    };

    let Ok(auth_request_id) = AuthRequestId::parse(&id) else {
        return AppErrorResponse::from(AppError::NotFound).into_response();
    };

    match state.store.load_state(auth_request_id).await {
        Ok(Some(found)) if found.tenant_id == tenant_id && found.tenant_id == query.restaurant_id => {
            Json(GetAuthStatusResponse::from(&found)).into_response()
        }
        // Unknown id and foreign-tenant id are deliberately indistinguishable (§4.1).
        Ok(_) => AppErrorResponse::from(AppError::NotFound).into_response(),
        Err(e) => AppErrorResponse::internal(e).into_response(),
    }
}

/// `POST /v1/authorize/{id}/void` (§4.1, §6).
pub async fn void(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<VoidAuthRequest>,
) -> Response {
    let tenant_id = match resolve_tenant(&headers, &state) {
        Ok(tenant) => tenant.to_owned(),
        Err(err) => return AppErrorResponse::from(err).into_response(),
    };

    let Ok(auth_request_id) = AuthRequestId::parse(&id) else {
        return AppErrorResponse::from(AppError::NotFound).into_response();
    };

    let current: AuthRequestState = match state.store.load_state(auth_request_id).await {
        Ok(Some(found)) if found.tenant_id == tenant_id => found,
        Ok(_) => return AppErrorResponse::from(AppError::NotFound).into_response(),
        Err(e) => return AppErrorResponse::internal(e).into_response(),
    };

    if current.void_requested {
        return Json(VoidAuthResponse { auth_request_id, status: current.status }).into_response();
    }

    let outbox = OutboxInsert {
        destination: Destination::VoidRequestQueue,
        message_group: auth_request_id.to_string(),
        payload: serde_json::json!({
            "auth_request_id": auth_request_id.to_string(),
            "tenant_id": tenant_id,
            "reason": req.reason.clone(),
            "idempotency_key": req.idempotency_key.clone(),
        }),
    };
    let kind = EventKind::AuthVoidRequested { reason: req.reason, idempotency_key: req.idempotency_key };

    let outcome = match state
        .store
        .append(auth_request_id, current.latest_applied_sequence, kind, None, None, Some(outbox), None)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => return AppErrorResponse::internal(e).into_response(),
    };

    Json(VoidAuthResponse { auth_request_id, status: outcome.state.status }).into_response()
}

/// `GET /health` — liveness only, never touches the database.
pub async fn health() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

/// `GET /ready` — readiness, checks store connectivity (§6).
pub async fn ready(State(state): State<Arc<AppState>>) -> Response {
    match state.store.load_state(AuthRequestId::new()).await {
        Ok(_) => Json(serde_json::json!({ "status": "ready" })).into_response(),
        Err(e) => AppErrorResponse::internal(e).into_response(),
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
