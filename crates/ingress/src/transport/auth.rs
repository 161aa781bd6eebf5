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
/// on the API key check (mirrors the teacher's bearer-token comparison).
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

/// Resolve the caller's tenant from an `X-Api-Key` header against the
/// loaded key map. Uses a constant-time comparison per key to avoid
/// leaking a key's prefix length through early-exit comparison timing.
pub fn resolve_tenant<'a>(headers: &HeaderMap, state: &'a AppState) -> Result<&'a str, AppError> {
    let supplied = headers.get("x-api-key").and_then(|v| v.to_str().ok()).ok_or(AppError::Unauthorized)?;

    state
        .api_keys
        .iter()
        .find(|(key, _)| constant_time_eq(key, supplied))
        .map(|(_, tenant)| tenant.as_str())
        .ok_or(AppError::Unauthorized)
}

/// Axum middleware enforcing `X-Api-Key` authentication. Exempt: `/health`
/// and `/ready`, which must work before any tenant provisioning exists.
pub async fn auth_layer(state: State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let path = req.uri().path();
    if path == "/health" || path == "/ready" {
        return next.run(req).await;
    }

    if resolve_tenant(req.headers(), &state).is_err() {
        return AppErrorResponse::from(AppError::Unauthorized).into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
