// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the Token Store surface (§4.7, §6).

use std::sync::Arc;

use authz_core::error::AppErrorResponse;
use authz_core::idempotency::Fingerprint;
use authz_core::ids::TokenId;
use authz_core::token_contract::{CreateTokenRequest, CreateTokenResponse, DecryptRequest, DecryptResponse};
use authz_core::AppError;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Deserialize;

use crate::dto::{GetPaymentTokenResponse, PaymentData};
use crate::state::AppState;
use crate::store::{DecryptAudit, DecryptAuditOutcome, TokenIdempotencyCheck, TokenRecord};
use crate::transport::auth::resolve_restaurant;

/// `POST /v1/payment-tokens` (§4.7 Create).
pub async fn create_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTokenRequest>,
) -> Response {
    let restaurant_id = match resolve_restaurant(&headers, &state) {
        Ok(id) => id.to_owned(),
        Err(err) => return AppErrorResponse::from(err).into_response(),
    };
    if restaurant_id != req.restaurant_id {
        return AppErrorResponse::from(AppError::Forbidden).into_response();
    }

    let fingerprint = Fingerprint::compute(&[&restaurant_id, &req.encrypted_payment_data]);

    if let Some(idempotency_key) = &req.idempotency_key {
        let existing = match state.store.find_idempotency_binding(&restaurant_id, idempotency_key).await {
            Ok(existing) => existing,
            Err(e) => return AppErrorResponse::internal(e).into_response(),
        };
        match TokenIdempotencyCheck::resolve(existing.as_ref().map(|(id, fp)| (id.as_str(), fp)), &fingerprint) {
            TokenIdempotencyCheck::ReplayOf(token_id) => {
                return Json(CreateTokenResponse { token_id }).into_response();
            }
            TokenIdempotencyCheck::Conflict { .. } => {
                return AppErrorResponse::from(AppError::IdempotencyConflict).into_response();
            }
            TokenIdempotencyCheck::Fresh => {}
        }
    }

    let (origin_key_id, plaintext) = match decrypt_incoming(&state, &req) {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };

    let payment_data: PaymentData = match serde_json::from_slice(&plaintext) {
        Ok(data) => data,
        Err(_) => return AppError::Validation.with_message("malformed payment data").into_response(),
    };

    let (service_key_version, nonce, ciphertext) = match state.service_keys.encrypt_current(&plaintext) {
        Ok(encrypted) => encrypted,
        Err(e) => return AppErrorResponse::internal(e).into_response(),
    };

    let token_id = TokenId::generate().to_string();
    let now = Utc::now();
    let record = TokenRecord {
        token_id: token_id.clone(),
        restaurant_id: restaurant_id.clone(),
        ciphertext,
        nonce,
        service_key_version,
        origin_key_id,
        brand: payment_data.brand(),
        last4: payment_data.last4(),
        expiry_month: Some(payment_data.expiry_month),
        expiry_year: Some(payment_data.expiry_year),
        client_metadata: req.client_metadata.clone().unwrap_or(serde_json::Value::Null),
        created_at: now,
        expires_at: now + state.config.token_ttl(),
    };

    let idempotency_binding = req.idempotency_key.clone().map(|key| (key, fingerprint));
    if let Err(e) = state.store.insert(record, idempotency_binding).await {
        return AppErrorResponse::internal(e).into_response();
    }

    (StatusCode::CREATED, Json(CreateTokenResponse { token_id })).into_response()
}

/// Resolves the partner/device key and decrypts `encrypted_payment_data`
/// (§4.7 steps 1-2). Returns the origin key id (for audit) and plaintext.
fn decrypt_incoming(state: &AppState, req: &CreateTokenRequest) -> Result<(String, Vec<u8>), Response> {
    let ciphertext_bytes = match b64::decode_payload(&req.encrypted_payment_data) {
        Ok(bytes) => bytes,
        Err(_) => {
            return Err(AppError::Validation.with_message("malformed ciphertext").into_response())
        }
    };

    match (&req.device_token, &req.encryption_metadata) {
        (Some(device_token), None) => {
            // Device flow embeds the nonce as the first 12 bytes of the
            // payload; there is no separate `iv_b64` field to carry it.
            if ciphertext_bytes.len() < 12 {
                return Err(AppErrorResponse::from(AppError::Validation).into_response());
            }
            let (nonce, ciphertext) = ciphertext_bytes.split_at(12);
            let plaintext = state
                .partner_keys
                .decrypt_device(device_token, nonce, ciphertext)
                .map_err(|_| AppError::Validation.with_message("DECRYPTION_FAILED").into_response())?;
            Ok(("device".to_owned(), plaintext))
        }
        (None, Some(metadata)) => {
            if metadata.algorithm != "AES-256-GCM" {
                return Err(AppError::Validation.with_message("unsupported algorithm").into_response());
            }
            let nonce = b64::decode_payload(&metadata.iv_b64)
                .map_err(|_| AppErrorResponse::from(AppError::Validation).into_response())?;
            let plaintext = state
                .partner_keys
                .decrypt_named(&metadata.key_id, &nonce, &ciphertext_bytes)
                .map_err(|err| match err {
                    crate::keys::KeyError::UnknownKey(_) => {
                        AppError::Validation.with_message("UNKNOWN_KEY").into_response()
                    }
                    _ => AppError::Validation.with_message("DECRYPTION_FAILED").into_response(),
                })?;
            Ok((metadata.key_id.clone(), plaintext))
        }
        _ => Err(AppError::Validation
            .with_message("exactly one of device_token or encryption_metadata is required")
            .into_response()),
    }
}

#[derive(Debug, Deserialize)]
pub struct GetTokenQuery {
    pub restaurant_id: String,
}

/// `GET /v1/payment-tokens/{id}` (§4.7 Get).
pub async fn get_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(token_id): Path<String>,
    Query(query): Query<GetTokenQuery>,
) -> Response {
    let restaurant_id = match resolve_restaurant(&headers, &state) {
        Ok(id) => id,
        Err(err) => return AppErrorResponse::from(err).into_response(),
    };

    let record = match state.store.get(&token_id).await {
        Ok(Some(record)) if record.restaurant_id == restaurant_id && record.restaurant_id == query.restaurant_id => record,
        // Unknown id and foreign-tenant id are deliberately indistinguishable.
        Ok(_) => return AppErrorResponse::from(AppError::NotFound).into_response(),
        Err(e) => return AppErrorResponse::internal(e).into_response(),
    };

    if record.expires_at < Utc::now() {
        return AppErrorResponse::from(AppError::Expired).into_response();
    }

    Json(GetPaymentTokenResponse::from(&record)).into_response()
}

/// `POST /internal/tokens/{token}/decrypt` (§4.7 Decrypt). Always writes a
/// `DecryptAudit` row, even on failure.
pub async fn decrypt_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(token_id): Path<String>,
    Json(req): Json<DecryptRequest>,
) -> Response {
    let requesting_service = headers.get("x-service-identity").and_then(|v| v.to_str().ok()).unwrap_or("unknown").to_owned();

    let (outcome_response, audit_outcome) = decrypt_token_inner(&state, &token_id, &req).await;

    let audit = DecryptAudit {
        token_id: token_id.clone(),
        requesting_service,
        correlation_id: Some(req.auth_request_id.clone()),
        outcome: audit_outcome,
    };
    if let Err(e) = state.store.append_decrypt_audit(audit).await {
        tracing::error!(error = %e, "failed to append decrypt audit row");
    }

    outcome_response
}

async fn decrypt_token_inner(
    state: &AppState,
    token_id: &str,
    req: &DecryptRequest,
) -> (Response, DecryptAuditOutcome) {
    let record = match state.store.get(token_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return (AppErrorResponse::from(AppError::NotFound).into_response(), DecryptAuditOutcome::NotFound),
        Err(e) => return (AppErrorResponse::internal(e).into_response(), DecryptAuditOutcome::NotFound),
    };

    if record.restaurant_id != req.tenant_id {
        return (AppErrorResponse::from(AppError::Forbidden).into_response(), DecryptAuditOutcome::Forbidden);
    }
    if record.expires_at < Utc::now() {
        return (AppErrorResponse::from(AppError::Expired).into_response(), DecryptAuditOutcome::Expired);
    }

    let plaintext = match state.service_keys.decrypt(record.service_key_version, &record.nonce, &record.ciphertext) {
        Ok(plaintext) => plaintext,
        Err(e) => return (AppErrorResponse::internal(e).into_response(), DecryptAuditOutcome::Forbidden),
    };

    let payment_data_json = match String::from_utf8(plaintext) {
        Ok(json) => json,
        Err(e) => return (AppErrorResponse::internal(e).into_response(), DecryptAuditOutcome::Forbidden),
    };

    (Json(DecryptResponse { payment_data: payment_data_json }).into_response(), DecryptAuditOutcome::Success)
}

pub async fn health() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

pub async fn ready(State(state): State<Arc<AppState>>) -> Response {
    match state.store.get("__readiness_probe__").await {
        Ok(_) => Json(serde_json::json!({ "status": "ready" })).into_response(),
        Err(e) => AppErrorResponse::internal(e).into_response(),
    }
}

/// Thin base64 helper so `decrypt_incoming` reads naturally; `base64`'s
/// `Engine` trait needs to be named at the call site either way.
mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    pub fn decode_payload(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(value)
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
