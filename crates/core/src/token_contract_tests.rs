use super::*;

#[test]
fn decrypt_request_roundtrips_through_json() {
    let req = DecryptRequest {
        auth_request_id: "ar_1".into(),
        tenant_id: "restaurant_1".into(),
        reason: DecryptReason::ProcessorAuthorization,
    };
    let json = serde_json::to_string(&req).unwrap();
    let back: DecryptRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(back.auth_request_id, "ar_1");
}

#[test]
fn decrypt_reason_serializes_snake_case() {
    let json = serde_json::to_value(DecryptReason::ProcessorVoid).unwrap();
    assert_eq!(json, serde_json::json!("processor_void"));
}
