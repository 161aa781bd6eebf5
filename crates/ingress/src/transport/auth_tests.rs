use super::*;
use std::collections::HashMap;
use std::sync::Arc;

use authz_core::store::InMemoryEventStore;
use clap::Parser;

fn test_state(api_keys: HashMap<String, String>) -> AppState {
    let config = crate::config::IngressConfig::parse_from([
        "authz-ingress",
        "--database-url",
        "postgres://localhost/test",
        "--api-keys-file",
        "/dev/null",
    ]);
    let store = Arc::new(InMemoryEventStore::new());
    AppState::new(config, store.clone(), store, api_keys)
}

#[test]
fn resolve_tenant_succeeds_for_a_known_key() {
    let mut keys = HashMap::new();
    keys.insert("sk_live_abc".to_string(), "restaurant_1".to_string());
    let state = test_state(keys);

    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", "sk_live_abc".parse().unwrap());

    assert_eq!(resolve_tenant(&headers, &state).unwrap(), "restaurant_1");
}

#[test]
fn resolve_tenant_rejects_an_unknown_key() {
    let state = test_state(HashMap::new());
    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", "sk_live_nope".parse().unwrap());

    assert!(resolve_tenant(&headers, &state).is_err());
}

#[test]
fn resolve_tenant_rejects_a_missing_header() {
    let state = test_state(HashMap::new());
    let headers = HeaderMap::new();
    assert!(resolve_tenant(&headers, &state).is_err());
}

#[test]
fn constant_time_eq_matches_identical_strings() {
    assert!(constant_time_eq("abc123", "abc123"));
    assert!(!constant_time_eq("abc123", "abc124"));
    assert!(!constant_time_eq("abc", "abcd"));
}
