// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the Token Store (§4.7, §6).

pub mod auth;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the axum `Router`, mirroring the teacher's
/// `build_router`/`build_router_inner` split: one auth middleware dispatches
/// per-path to the client-API-key check or the internal service-auth check,
/// since the client-facing and internal surfaces share this one router
/// (§6 "HTTP surface (Token Store)").
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/v1/payment-tokens", post(handlers::create_token))
        .route("/v1/payment-tokens/{id}", get(handlers::get_token))
        .route("/internal/tokens/{token}/decrypt", post(handlers::decrypt_token))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
