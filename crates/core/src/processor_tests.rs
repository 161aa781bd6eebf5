use super::*;
use crate::money::Currency;

fn call_with(pan: &str) -> AuthorizeCall {
    AuthorizeCall {
        auth_request_id: "ar_1".into(),
        decrypted_payment_data: pan.into(),
        amount: Money::new(5000, Currency::USD).unwrap(),
        idempotency_key: "idem-1".into(),
    }
}

#[tokio::test]
async fn mock_processor_authorizes_an_unrecognized_pan() {
    let outcome = MockProcessor.authorize(call_with("4242424242424242")).await.unwrap();
    assert!(matches!(outcome, ProcessorOutcome::Authorized(_)));
}

#[tokio::test]
async fn mock_processor_declines_insufficient_funds_pan() {
    let outcome = MockProcessor.authorize(call_with(MockProcessor::DECLINE_INSUFFICIENT_FUNDS)).await.unwrap();
    match outcome {
        ProcessorOutcome::Denied(result) => assert_eq!(result.denial_code, DenialCode::InsufficientFunds),
        other => panic!("expected denial, got {other:?}"),
    }
}

#[tokio::test]
async fn mock_processor_transient_pan_is_retryable() {
    let outcome = MockProcessor.authorize(call_with(MockProcessor::TRANSIENT_ERROR)).await.unwrap();
    match outcome {
        ProcessorOutcome::Failed { is_retryable, .. } => assert!(is_retryable),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn mock_processor_rate_limited_pan_is_retryable_and_distinct_from_transient() {
    let outcome = MockProcessor.authorize(call_with(MockProcessor::RATE_LIMITED_ERROR)).await.unwrap();
    match outcome {
        ProcessorOutcome::Failed { is_retryable, error_code, .. } => {
            assert!(is_retryable);
            assert_ne!(error_code, "processor_transient");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn mock_processor_terminal_pan_is_not_retryable() {
    let outcome = MockProcessor.authorize(call_with(MockProcessor::TERMINAL_ERROR)).await.unwrap();
    match outcome {
        ProcessorOutcome::Failed { is_retryable, .. } => assert!(!is_retryable),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn classify_status_treats_429_and_5xx_as_retryable() {
    assert!(classify_status(429));
    assert!(classify_status(500));
    assert!(classify_status(503));
    assert!(!classify_status(400));
    assert!(!classify_status(402));
}
