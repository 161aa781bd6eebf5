// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-facing wire types for the Token Store (§4.7, §6). The
//! service-to-service Create/Decrypt contract shared with the worker
//! lives in `authz_core::token_contract` instead, so both sides compile
//! against the same types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::TokenRecord;

/// `GET /v1/payment-tokens/{id}` response — metadata only, never ciphertext
/// or PAN (§4.7 "Get ... returns non-sensitive metadata").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPaymentTokenResponse {
    pub token_id: String,
    pub restaurant_id: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub expiry_month: Option<i32>,
    pub expiry_year: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&TokenRecord> for GetPaymentTokenResponse {
    fn from(record: &TokenRecord) -> Self {
        Self {
            token_id: record.token_id.clone(),
            restaurant_id: record.restaurant_id.clone(),
            brand: record.brand.clone(),
            last4: record.last4.clone(),
            expiry_month: record.expiry_month,
            expiry_year: record.expiry_year,
            created_at: record.created_at,
            expires_at: record.expires_at,
        }
    }
}

/// The plaintext structure extracted from `encrypted_payment_data` on
/// Create (§4.7 step 3) and reassembled on Decrypt. Serialized to/from the
/// JSON string carried as ciphertext — never logged, never persisted in
/// cleartext (§4.7 "Invariants").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentData {
    pub pan: String,
    pub expiry_month: i32,
    pub expiry_year: i32,
    pub cvv: Option<String>,
    pub cardholder_name: Option<String>,
    pub address: Option<serde_json::Value>,
}

impl PaymentData {
    /// Derives the non-sensitive metadata stored alongside the ciphertext
    /// (§4.7 step 3 "derive non-sensitive metadata").
    pub fn brand(&self) -> Option<String> {
        match self.pan.as_bytes().first() {
            Some(b'4') => Some("visa".to_owned()),
            Some(b'5') => Some("mastercard".to_owned()),
            Some(b'3') => Some("amex".to_owned()),
            Some(b'6') => Some("discover".to_owned()),
            _ => None,
        }
    }

    pub fn last4(&self) -> Option<String> {
        (self.pan.len() >= 4).then(|| self.pan[self.pan.len() - 4..].to_owned())
    }
}

#[cfg(test)]
#[path = "dto_tests.rs"]
mod tests;
