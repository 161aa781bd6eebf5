// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use authz_core::error::AppErrorResponse;
use authz_core::AppError;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// Constant-time string comparison, guarding against a timing side-channel
/// on the API-key/service-secret checks (mirrors authz-ingress's
/// `constant_time_eq`).
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Resolves the caller's restaurant from an `X-Api-Key` header (client
/// surface: Create/Get, §4.7).
pub fn resolve_restaurant<'a>(headers: &HeaderMap, state: &'a AppState) -> Result<&'a str, AppError> {
    let supplied = headers.get("x-api-key").and_then(|v| v.to_str().ok()).ok_or(AppError::Unauthorized)?;

    state
        .api_keys
        .iter()
        .find(|(key, _)| constant_time_eq(key, supplied))
        .map(|(_, restaurant)| restaurant.as_str())
        .ok_or(AppError::Unauthorized)
}

/// Authenticates an internal caller's `X-Service-Auth` header AND checks
/// it against the allow-list (§4.7 Decrypt: "the identity MUST appear on
/// the allow-list of permitted consumers"). The service identity itself is
/// carried in a separate `X-Service-Identity` header since a shared secret
/// alone cannot name the caller.
pub fn resolve_service_identity(headers: &HeaderMap, state: &AppState) -> Result<String, AppError> {
    let secret = headers.get("x-service-auth").and_then(|v| v.to_str().ok()).ok_or(AppError::Forbidden)?;
    if !constant_time_eq(secret, &state.config.service_auth_secret) {
        return Err(AppError::Forbidden);
    }
    let identity = headers.get("x-service-identity").and_then(|v| v.to_str().ok()).ok_or(AppError::Forbidden)?;
    if !state.service_is_allowed(identity) {
        return Err(AppError::Forbidden);
    }
    Ok(identity.to_owned())
}

/// Axum middleware dispatching to the client-API-key check or the internal
/// service-auth check by path, since both surfaces share one router
/// (§6 "HTTP surface (Token Store)"). `/health` and `/ready` are exempt.
pub async fn auth_layer(state: State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let path = req.uri().path();
    if path == "/health" || path == "/ready" {
        return next.run(req).await;
    }

    if path.starts_with("/internal/") {
        if resolve_service_identity(req.headers(), &state).is_err() {
            return AppErrorResponse::from(AppError::Forbidden).into_response();
        }
    } else if resolve_restaurant(req.headers(), &state).is_err() {
        return AppErrorResponse::from(AppError::Unauthorized).into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
