use super::*;
use std::collections::HashMap;

use crate::keys::{PartnerKeyRegistry, ServiceKeyRegistry};
use crate::store::InMemoryTokenStore;
use clap::Parser;

fn test_state(api_keys: HashMap<String, String>, allowed_services: Vec<String>) -> AppState {
    let config = crate::config::TokenStoreConfig::parse_from([
        "token-store",
        "--database-url",
        "postgres://localhost/test",
        "--api-keys-file",
        "/dev/null",
        "--partner-keys-file",
        "/dev/null",
        "--primary-encryption-key",
        "00".repeat(32).as_str(),
        "--service-auth-secret",
        "s3cr3t",
        "--allowed-services",
        allowed_services.join(","),
    ]);
    let store = Arc::new(InMemoryTokenStore::new());
    let partner_keys = PartnerKeyRegistry::new(HashMap::new());
    let service_keys = ServiceKeyRegistry::new(1, HashMap::from([(1, [9u8; 32])])).unwrap();
    AppState::new(config, store, partner_keys, service_keys, api_keys)
}

#[test]
fn resolve_restaurant_succeeds_for_a_known_key() {
    let mut keys = HashMap::new();
    keys.insert("sk_live_abc".to_string(), "restaurant_1".to_string());
    let state = test_state(keys, vec![]);

    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", "sk_live_abc".parse().unwrap());

    assert_eq!(resolve_restaurant(&headers, &state).unwrap(), "restaurant_1");
}

#[test]
fn resolve_restaurant_rejects_an_unknown_key() {
    let state = test_state(HashMap::new(), vec![]);
    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", "sk_live_nope".parse().unwrap());
    assert!(resolve_restaurant(&headers, &state).is_err());
}

#[test]
fn resolve_service_identity_accepts_an_allow_listed_caller() {
    let state = test_state(HashMap::new(), vec!["authz-worker".to_owned()]);
    let mut headers = HeaderMap::new();
    headers.insert("x-service-auth", "s3cr3t".parse().unwrap());
    headers.insert("x-service-identity", "authz-worker".parse().unwrap());

    assert_eq!(resolve_service_identity(&headers, &state).unwrap(), "authz-worker");
}

#[test]
fn resolve_service_identity_rejects_a_non_allow_listed_caller() {
    let state = test_state(HashMap::new(), vec!["authz-worker".to_owned()]);
    let mut headers = HeaderMap::new();
    headers.insert("x-service-auth", "s3cr3t".parse().unwrap());
    headers.insert("x-service-identity", "some-other-service".parse().unwrap());

    assert!(resolve_service_identity(&headers, &state).is_err());
}

#[test]
fn resolve_service_identity_rejects_a_wrong_secret() {
    let state = test_state(HashMap::new(), vec!["authz-worker".to_owned()]);
    let mut headers = HeaderMap::new();
    headers.insert("x-service-auth", "wrong".parse().unwrap());
    headers.insert("x-service-identity", "authz-worker".parse().unwrap());

    assert!(resolve_service_identity(&headers, &state).is_err());
}

#[test]
fn constant_time_eq_matches_identical_strings() {
    assert!(constant_time_eq("abc123", "abc123"));
    assert!(!constant_time_eq("abc123", "abc124"));
    assert!(!constant_time_eq("abc", "abcd"));
}
