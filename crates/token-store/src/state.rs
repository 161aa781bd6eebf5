// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::TokenStoreConfig;
use crate::keys::{PartnerKeyRegistry, ServiceKeyRegistry};
use crate::store::TokenStore;

/// Shared application state, following the teacher's `MuxState` shape and
/// the authz-ingress `AppState` split: one `Arc<AppState>` injected into
/// every handler via axum's `State` extractor.
pub struct AppState {
    pub config: TokenStoreConfig,
    pub store: Arc<dyn TokenStore>,
    pub partner_keys: PartnerKeyRegistry,
    pub service_keys: ServiceKeyRegistry,
    /// API key -> restaurant id, loaded once at startup (client-facing
    /// Create/Get surface).
    pub api_keys: HashMap<String, String>,
}

impl AppState {
    pub fn new(
        config: TokenStoreConfig,
        store: Arc<dyn TokenStore>,
        partner_keys: PartnerKeyRegistry,
        service_keys: ServiceKeyRegistry,
        api_keys: HashMap<String, String>,
    ) -> Self {
        Self { config, store, partner_keys, service_keys, api_keys }
    }

    pub fn restaurant_for_api_key(&self, api_key: &str) -> Option<&str> {
        self.api_keys.get(api_key).map(String::as_str)
    }

    pub fn service_is_allowed(&self, identity: &str) -> bool {
        self.config.allowed_services.iter().any(|allowed| allowed == identity)
    }
}

pub fn load_api_keys(path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let contents = std::fs::read_to_string(path)?;
    let map: HashMap<String, String> = serde_json::from_str(&contents)?;
    Ok(map)
}

/// Named keys for the partner/device decryption path, keyed by `key_id`
/// (§4.7 step 1). File shape: `{"key_id": "<64 hex chars>", ...}`.
pub fn load_partner_keys(path: &std::path::Path) -> anyhow::Result<HashMap<String, [u8; 32]>> {
    let contents = std::fs::read_to_string(path)?;
    let raw: HashMap<String, String> = serde_json::from_str(&contents)?;
    raw.into_iter().map(|(id, hex_key)| Ok((id, parse_hex_key(&hex_key)?))).collect()
}

/// Retired service key versions, keyed by version number as a string in
/// the file (JSON object keys are always strings). File shape:
/// `{"1": "<64 hex chars>", ...}`.
pub fn load_service_keys(path: &std::path::Path) -> anyhow::Result<HashMap<i32, [u8; 32]>> {
    let contents = std::fs::read_to_string(path)?;
    let raw: HashMap<String, String> = serde_json::from_str(&contents)?;
    raw.into_iter()
        .map(|(version, hex_key)| {
            let version: i32 = version.parse()?;
            Ok((version, parse_hex_key(&hex_key)?))
        })
        .collect()
}

fn parse_hex_key(hex_key: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex::decode(hex_key)?;
    bytes.try_into().map_err(|_| anyhow::anyhow!("key material must be exactly 32 bytes"))
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
