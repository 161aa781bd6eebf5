// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response bodies for the ingress HTTP surface (§6). These are the
//! JSON wire shapes; they are deliberately separate types from
//! `authz_core::read_model::AuthRequestState` so the public contract can
//! evolve independently of the internal read model.

use authz_core::ids::AuthRequestId;
use authz_core::read_model::{AuthRequestState, AuthStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub payment_token: String,
    pub amount_minor: i64,
    pub currency: String,
    pub idempotency_key: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationResultBody {
    pub processor_name: Option<String>,
    pub processor_auth_id: Option<String>,
    pub authorization_code: Option<String>,
    pub authorized_amount_minor: Option<i64>,
    pub denial_code: Option<String>,
    pub denial_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeResponse {
    pub auth_request_id: AuthRequestId,
    pub status: AuthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AuthorizationResultBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_url: Option<String>,
}

impl AuthorizeResponse {
    pub fn from_state(state: &AuthRequestState, status_url_if_pending: impl FnOnce() -> String) -> Self {
        let status_url = (!state.status.is_terminal()).then(status_url_if_pending);
        let result = state.status.is_terminal().then(|| AuthorizationResultBody {
            processor_name: state.processor_name.clone(),
            processor_auth_id: state.processor_auth_id.clone(),
            authorization_code: state.authorization_code.clone(),
            authorized_amount_minor: state.authorized_amount_minor,
            denial_code: state.denial_code.clone(),
            denial_reason: state.denial_reason.clone(),
        });
        Self { auth_request_id: state.auth_request_id, status: state.status, result, status_url }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GetAuthStatusResponse {
    pub auth_request_id: AuthRequestId,
    pub status: AuthStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub result: Option<AuthorizationResultBody>,
    pub void_requested: bool,
    pub error_message: Option<String>,
}

impl From<&AuthRequestState> for GetAuthStatusResponse {
    fn from(state: &AuthRequestState) -> Self {
        let result = state.status.is_terminal().then(|| AuthorizationResultBody {
            processor_name: state.processor_name.clone(),
            processor_auth_id: state.processor_auth_id.clone(),
            authorization_code: state.authorization_code.clone(),
            authorized_amount_minor: state.authorized_amount_minor,
            denial_code: state.denial_code.clone(),
            denial_reason: state.denial_reason.clone(),
        });
        Self {
            auth_request_id: state.auth_request_id,
            status: state.status,
            amount_minor: state.amount_minor,
            currency: state.currency.code().to_owned(),
            result,
            void_requested: state.void_requested,
            error_message: state.error_message.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VoidAuthRequest {
    pub reason: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoidAuthResponse {
    pub auth_request_id: AuthRequestId,
    pub status: AuthStatus,
}

#[cfg(test)]
#[path = "dto_tests.rs"]
mod tests;
