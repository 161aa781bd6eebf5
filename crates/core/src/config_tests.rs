use super::*;

#[test]
fn retry_base_duration_converts_millis() {
    let cfg = RetryConfig { max_retries: 5, retry_base_ms: 200 };
    assert_eq!(cfg.base_duration(), std::time::Duration::from_millis(200));
}
