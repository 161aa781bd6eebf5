// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::Arc;

use authz_core::idempotency::IdempotencyStore;
use authz_core::store::EventStore;

use crate::config::IngressConfig;

/// Shared application state, following the teacher's `MuxState` shape:
/// one `Arc<AppState>` injected into every handler via axum's `State`
/// extractor.
pub struct AppState {
    pub config: IngressConfig,
    pub store: Arc<dyn EventStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    /// API key -> tenant id, loaded once at startup from `config.api_keys_file`.
    pub api_keys: HashMap<String, String>,
}

impl AppState {
    pub fn new(
        config: IngressConfig,
        store: Arc<dyn EventStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        api_keys: HashMap<String, String>,
    ) -> Self {
        Self { config, store, idempotency, api_keys }
    }

    pub fn tenant_for_api_key(&self, api_key: &str) -> Option<&str> {
        self.api_keys.get(api_key).map(String::as_str)
    }
}

pub fn load_api_keys(path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let contents = std::fs::read_to_string(path)?;
    let map: HashMap<String, String> = serde_json::from_str(&contents)?;
    Ok(map)
}
