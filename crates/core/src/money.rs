// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minor-unit money and a closed-set ISO currency allow-list.
//!
//! Amounts are always minor units (cents) to avoid floating point entirely;
//! §8 requires `amount = 0` and `amount < 0` to be rejected at ingress, so
//! `Money::new` enforces `amount_minor > 0`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed allow-list of supported ISO 4217 currency codes. A real deployment
/// would load this from a config table; the core ships a fixed set covering
/// the currencies exercised by the mock processor and the test suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl Currency {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "USD" => Some(Self::USD),
            "EUR" => Some(Self::EUR),
            "GBP" => Some(Self::GBP),
            "CAD" => Some(Self::CAD),
            "AUD" => Some(Self::AUD),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A monetary amount in minor units (e.g. cents) plus its currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount_minor: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("amount_minor must be positive, got {0}")]
    NonPositiveAmount(i64),
}

impl Money {
    pub fn new(amount_minor: i64, currency: Currency) -> Result<Self, MoneyError> {
        if amount_minor <= 0 {
            return Err(MoneyError::NonPositiveAmount(amount_minor));
        }
        Ok(Self { amount_minor, currency })
    }
}

#[cfg(test)]
#[path = "money_tests.rs"]
mod tests;
