// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client for the Token Store's internal `Decrypt` endpoint (§4.5 step 4,
//! §4.7 Decrypt). Classifies the response into the same
//! retryable/terminal split the processor adapter uses, so the worker's
//! retry rule treats a token-store hiccup the same way it treats a
//! processor hiccup.

use async_trait::async_trait;

use authz_core::ids::AuthRequestId;
use authz_core::token_contract::{DecryptReason, DecryptRequest, DecryptResponse};

#[derive(Debug, Clone)]
pub enum DecryptOutcome {
    Success(String),
    /// `NOT_FOUND` / `FORBIDDEN` / `EXPIRED` (§4.5 step 4) — no retry budget
    /// is worth spending, the token will never become decryptable.
    Terminal { error_code: String },
    /// Transport failure or a 5xx/429 from token-store.
    Retryable { error_code: String },
}

#[async_trait]
pub trait TokenClient: Send + Sync {
    async fn decrypt(
        &self,
        auth_request_id: AuthRequestId,
        tenant_id: &str,
        payment_token: &str,
        reason: DecryptReason,
    ) -> DecryptOutcome;
}

/// Production client calling `POST {base}/internal/tokens/{token}/decrypt`
/// authenticated via the `X-Service-Auth` shared secret and the
/// `X-Service-Identity` allow-list header (§4.7, §10).
pub struct HttpTokenClient {
    client: reqwest::Client,
    base_url: String,
    service_auth: String,
    service_identity: String,
}

impl HttpTokenClient {
    pub fn new(
        base_url: impl Into<String>,
        service_auth: impl Into<String>,
        service_identity: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            service_auth: service_auth.into(),
            service_identity: service_identity.into(),
        }
    }
}

#[async_trait]
impl TokenClient for HttpTokenClient {
    async fn decrypt(
        &self,
        auth_request_id: AuthRequestId,
        tenant_id: &str,
        payment_token: &str,
        reason: DecryptReason,
    ) -> DecryptOutcome {
        let url = format!("{}/internal/tokens/{}/decrypt", self.base_url, payment_token);
        let body =
            DecryptRequest { auth_request_id: auth_request_id.to_string(), tenant_id: tenant_id.to_owned(), reason };

        let response = match self
            .client
            .post(&url)
            .header("X-Service-Auth", &self.service_auth)
            .header("X-Service-Identity", &self.service_identity)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return DecryptOutcome::Retryable { error_code: format!("token_store_transport: {e}") },
        };

        match response.status().as_u16() {
            200 => match response.json::<DecryptResponse>().await {
                Ok(decoded) => DecryptOutcome::Success(decoded.payment_data),
                Err(e) => DecryptOutcome::Retryable { error_code: format!("token_store_protocol: {e}") },
            },
            404 => DecryptOutcome::Terminal { error_code: "token_not_found".into() },
            403 => DecryptOutcome::Terminal { error_code: "token_forbidden".into() },
            410 => DecryptOutcome::Terminal { error_code: "token_expired".into() },
            status if status == 429 || (500..600).contains(&status) => {
                DecryptOutcome::Retryable { error_code: format!("token_store_http_{status}") }
            }
            status => DecryptOutcome::Terminal { error_code: format!("token_store_http_{status}") },
        }
    }
}

/// Deterministic mock for worker unit tests and local dev without a live
/// token-store (§10 testing conventions). Keyed the same way
/// `processor::MockProcessor` keys its deterministic outcomes.
pub struct MockTokenClient;

impl MockTokenClient {
    pub const NOT_FOUND_TOKEN: &'static str = "pt_not_found";
    pub const FORBIDDEN_TOKEN: &'static str = "pt_forbidden";
    pub const TRANSIENT_TOKEN: &'static str = "pt_transient";
}

#[async_trait]
impl TokenClient for MockTokenClient {
    async fn decrypt(
        &self,
        _auth_request_id: AuthRequestId,
        _tenant_id: &str,
        payment_token: &str,
        _reason: DecryptReason,
    ) -> DecryptOutcome {
        match payment_token {
            Self::NOT_FOUND_TOKEN => DecryptOutcome::Terminal { error_code: "token_not_found".into() },
            Self::FORBIDDEN_TOKEN => DecryptOutcome::Terminal { error_code: "token_forbidden".into() },
            Self::TRANSIENT_TOKEN => DecryptOutcome::Retryable { error_code: "token_store_http_503".into() },
            // Echoes the token back as the "decrypted" payload so tests can
            // drive `processor::MockProcessor`'s own magic-PAN outcomes by
            // choosing the payment token value directly.
            other => DecryptOutcome::Success(other.to_owned()),
        }
    }
}

#[cfg(test)]
#[path = "token_client_tests.rs"]
mod tests;
