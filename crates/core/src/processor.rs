// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The processor adapter boundary (§4.6) — the trait every concrete card
//! processor integration implements, a deterministic mock used in tests and
//! local dev, and a Stripe-shaped HTTP adapter.
//!
//! The trait returns a closed `ProcessorOutcome` rather than a raw HTTP
//! status: classification into retryable / terminal-failure / business
//! decline happens once, at the adapter boundary, so nothing upstream needs
//! processor-specific knowledge.

use async_trait::async_trait;
use chrono::Utc;

use crate::events::{AuthorizedResult, DeniedResult, DenialCode};
use crate::money::Money;

#[derive(Debug, Clone)]
pub struct AuthorizeCall {
    pub auth_request_id: String,
    pub decrypted_payment_data: String,
    pub amount: Money,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct VoidCall {
    pub processor_auth_id: String,
    pub reason: String,
}

/// The three shapes a processor call can resolve to (§4.6).
#[derive(Debug, Clone)]
pub enum ProcessorOutcome {
    Authorized(AuthorizedResult),
    Denied(DeniedResult),
    /// A call that failed before producing a processor-side decision.
    /// `is_retryable = false` means the worker should escalate straight to
    /// `AuthAttemptFailed` without consuming a retry budget (e.g. a
    /// malformed request the processor will never accept).
    Failed { is_retryable: bool, error_code: String, error_message: String },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProcessorError {
    #[error("transport error calling processor: {0}")]
    Transport(String),
    #[error("processor returned an unparseable response: {0}")]
    Protocol(String),
}

/// Implemented once per third-party processor (§4.6). `authorize` and
/// `void` are async since every real implementation is an outbound HTTP
/// call.
#[async_trait]
pub trait ProcessorAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn authorize(&self, call: AuthorizeCall) -> Result<ProcessorOutcome, ProcessorError>;

    async fn void(&self, call: VoidCall) -> Result<(), ProcessorError>;
}

/// Deterministic mock processor for tests and local dev, keyed off
/// conventional test PANs the way most processor sandboxes behave: a small
/// closed set of decrypted payloads maps to a fixed outcome so test
/// scenarios (§8) are reproducible without any network access.
pub struct MockProcessor;

impl MockProcessor {
    pub const DECLINE_INSUFFICIENT_FUNDS: &'static str = "4000000000009995";
    pub const DECLINE_GENERIC: &'static str = "4000000000000002";
    /// Retryable PAN simulating a processor-side timeout (§4.6 "mandatory
    /// minimum outcome set").
    pub const TRANSIENT_ERROR: &'static str = "4000000000000119";
    /// Retryable PAN simulating a 429 rate limit, classified independently
    /// of `TRANSIENT_ERROR` so the two retryable causes are each
    /// separately testable (§4.6).
    pub const RATE_LIMITED_ERROR: &'static str = "4000000000000259";
    pub const TERMINAL_ERROR: &'static str = "4000000000000101";
}

#[async_trait]
impl ProcessorAdapter for MockProcessor {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn authorize(&self, call: AuthorizeCall) -> Result<ProcessorOutcome, ProcessorError> {
        let outcome = match call.decrypted_payment_data.as_str() {
            Self::DECLINE_INSUFFICIENT_FUNDS => ProcessorOutcome::Denied(DeniedResult {
                processor_name: "mock".into(),
                denial_code: DenialCode::InsufficientFunds,
                denial_reason: "insufficient_funds".into(),
                processor_metadata: serde_json::json!({}),
            }),
            Self::DECLINE_GENERIC => ProcessorOutcome::Denied(DeniedResult {
                processor_name: "mock".into(),
                denial_code: DenialCode::GenericDecline,
                denial_reason: "do_not_honor".into(),
                processor_metadata: serde_json::json!({}),
            }),
            Self::TRANSIENT_ERROR => ProcessorOutcome::Failed {
                is_retryable: true,
                error_code: "processor_transient".into(),
                error_message: "mock processor simulated a transient timeout".into(),
            },
            Self::RATE_LIMITED_ERROR => ProcessorOutcome::Failed {
                is_retryable: true,
                error_code: "processor_rate_limited".into(),
                error_message: "mock processor simulated a 429 rate limit".into(),
            },
            Self::TERMINAL_ERROR => ProcessorOutcome::Failed {
                is_retryable: false,
                error_code: "processor_rejected".into(),
                error_message: "mock processor simulated an unrecoverable rejection".into(),
            },
            _ => ProcessorOutcome::Authorized(AuthorizedResult {
                processor_name: "mock".into(),
                processor_auth_id: format!("mock_auth_{}", &call.idempotency_key),
                authorization_code: Some("MOCK00".into()),
                authorized_amount_minor: call.amount.amount_minor,
                currency: call.amount.currency,
                authorized_at: Utc::now(),
                processor_metadata: serde_json::json!({}),
            }),
        };
        Ok(outcome)
    }

    async fn void(&self, _call: VoidCall) -> Result<(), ProcessorError> {
        Ok(())
    }
}

/// HTTP-backed adapter for Stripe's PaymentIntents-shaped confirm/void API.
/// Kept thin: the retry classification lives entirely in `classify_status`
/// so the decision of retryable-vs-terminal is unit-testable without a
/// live network call.
pub struct StripeProcessor {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeProcessor {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), api_base: api_base.into(), secret_key: secret_key.into() }
    }
}

/// Classifies an HTTP status from the processor into retry policy (§4.6).
/// 5xx and 429 are transient; 4xx (other than 429) are terminal business
/// rejections surfaced to the caller as a denial rather than a failure.
pub fn classify_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

#[async_trait]
impl ProcessorAdapter for StripeProcessor {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn authorize(&self, call: AuthorizeCall) -> Result<ProcessorOutcome, ProcessorError> {
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(&[
                ("amount", call.amount.amount_minor.to_string()),
                ("currency", call.amount.currency.code().to_ascii_lowercase()),
                ("payment_method_data[type]", "card".to_string()),
                ("confirm", "true".to_string()),
                ("idempotency_key", call.idempotency_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 200 {
            let body: serde_json::Value =
                response.json().await.map_err(|e| ProcessorError::Protocol(e.to_string()))?;
            let auth_id = body["id"].as_str().unwrap_or_default().to_string();
            return Ok(ProcessorOutcome::Authorized(AuthorizedResult {
                processor_name: "stripe".into(),
                processor_auth_id: auth_id,
                authorization_code: body["charges"]["data"][0]["authorization_code"].as_str().map(String::from),
                authorized_amount_minor: call.amount.amount_minor,
                currency: call.amount.currency,
                authorized_at: Utc::now(),
                processor_metadata: body,
            }));
        }
        if status == 402 {
            let body: serde_json::Value =
                response.json().await.map_err(|e| ProcessorError::Protocol(e.to_string()))?;
            let decline_code = body["error"]["decline_code"].as_str().unwrap_or("generic_decline");
            return Ok(ProcessorOutcome::Denied(DeniedResult {
                processor_name: "stripe".into(),
                denial_code: map_decline_code(decline_code),
                denial_reason: decline_code.to_string(),
                processor_metadata: body,
            }));
        }
        Ok(ProcessorOutcome::Failed {
            is_retryable: classify_status(status),
            error_code: format!("stripe_http_{status}"),
            error_message: format!("stripe returned HTTP {status}"),
        })
    }

    async fn void(&self, call: VoidCall) -> Result<(), ProcessorError> {
        self.client
            .post(format!("{}/v1/payment_intents/{}/cancel", self.api_base, call.processor_auth_id))
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .send()
            .await
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;
        Ok(())
    }
}

fn map_decline_code(code: &str) -> DenialCode {
    match code {
        "insufficient_funds" => DenialCode::InsufficientFunds,
        "expired_card" => DenialCode::ExpiredCard,
        "incorrect_cvc" => DenialCode::IncorrectCvc,
        "fraudulent" | "stolen_card" | "lost_card" => DenialCode::Fraudulent,
        "authentication_required" => DenialCode::AuthenticationRequired,
        _ => DenialCode::GenericDecline,
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
