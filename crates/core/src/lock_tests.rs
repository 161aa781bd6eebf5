use super::*;

#[tokio::test]
async fn second_acquire_before_expiry_fails() {
    let lock = InMemoryLock::new();
    let id = AuthRequestId::new();
    let w1 = WorkerId::new();
    let w2 = WorkerId::new();

    let _handle = lock.acquire(id, w1, std::time::Duration::from_secs(30)).await.unwrap();
    let second = lock.acquire(id, w2, std::time::Duration::from_secs(30)).await;
    assert!(matches!(second, Err(LockError::AlreadyHeld(_))));
}

#[tokio::test]
async fn acquire_after_expiry_succeeds_for_a_new_holder() {
    let lock = InMemoryLock::new();
    let id = AuthRequestId::new();
    let w1 = WorkerId::new();
    let w2 = WorkerId::new();

    let _handle = lock.acquire(id, w1, std::time::Duration::from_millis(1)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let second = lock.acquire(id, w2, std::time::Duration::from_secs(30)).await;
    assert!(second.is_ok());
}

#[tokio::test]
async fn renew_by_a_different_fence_token_fails() {
    let lock = InMemoryLock::new();
    let id = AuthRequestId::new();
    let w1 = WorkerId::new();

    let handle = lock.acquire(id, w1, std::time::Duration::from_millis(1)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    // Someone else took over after expiry, bumping the fence token.
    let _stolen = lock.acquire(id, WorkerId::new(), std::time::Duration::from_secs(30)).await.unwrap();

    let renewed = lock.renew(&handle, std::time::Duration::from_secs(30)).await;
    assert!(matches!(renewed, Err(LockError::FencingMismatch(_))));
}

#[tokio::test]
async fn release_then_acquire_by_another_worker_succeeds_immediately() {
    let lock = InMemoryLock::new();
    let id = AuthRequestId::new();
    let w1 = WorkerId::new();
    let w2 = WorkerId::new();

    let handle = lock.acquire(id, w1, std::time::Duration::from_secs(30)).await.unwrap();
    lock.release(&handle).await.unwrap();
    let second = lock.acquire(id, w2, std::time::Duration::from_secs(30)).await;
    assert!(second.is_ok());
}
