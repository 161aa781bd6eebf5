// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire contract shared between `authz-worker` and `token-store` (§4.7).
//! Lives in `authz-core` rather than either service crate so both sides
//! compile against the same types instead of hand-keeping two JSON shapes
//! in sync.

use serde::{Deserialize, Serialize};

/// `POST /internal/tokens/{token_id}/decrypt` request. Authenticated via
/// the `X-Service-Auth` header (§10), never via a client-facing API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptRequest {
    pub auth_request_id: String,
    pub tenant_id: String,
    pub reason: DecryptReason,
}

/// Why the caller needed the decrypted payment data, recorded in
/// `decrypt_audit_log` (§4.7) so every decrypt is attributable to a
/// specific authorization attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptReason {
    ProcessorAuthorization,
    ProcessorVoid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptResponse {
    pub payment_data: String,
}

/// `POST /v1/tokens` request, **exactly one of** `device_token` or
/// `encryption_metadata` per §4.7's Create contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTokenRequest {
    pub restaurant_id: String,
    pub encrypted_payment_data: String,
    pub idempotency_key: Option<String>,
    pub client_metadata: Option<serde_json::Value>,
    pub device_token: Option<String>,
    pub encryption_metadata: Option<EncryptionMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    pub key_id: String,
    pub algorithm: String,
    pub iv_b64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTokenResponse {
    pub token_id: String,
}

#[cfg(test)]
#[path = "token_contract_tests.rs"]
mod tests;
