// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the authorization ingress (§4.1, §6).

pub mod auth;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the axum `Router` with all ingress routes, mirroring the teacher's
/// `build_router`/`build_router_inner` split (auth middleware + permissive
/// CORS layered over a plain route table).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/v1/authorize", post(handlers::authorize))
        .route("/v1/authorize/{id}/status", get(handlers::get_status))
        .route("/v1/authorize/{id}/void", post(handlers::void))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
