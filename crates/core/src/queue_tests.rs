use super::*;

fn msg(dedup_key: &str, group: &str) -> QueueMessage {
    QueueMessage {
        dedup_key: dedup_key.into(),
        message_group: group.into(),
        payload: b"payload".to_vec(),
        receipt_handle: "h1".into(),
    }
}

#[tokio::test]
async fn messages_in_the_same_group_are_received_in_publish_order() {
    let queue = InMemoryQueue::new();
    queue.publish(Destination::AuthRequestQueue, msg("d1", "ar-1")).await.unwrap();
    queue.publish(Destination::AuthRequestQueue, msg("d2", "ar-1")).await.unwrap();

    let batch = queue.receive(Destination::AuthRequestQueue, 10, std::time::Duration::from_millis(10)).await.unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].dedup_key, "d1");
    assert_eq!(batch[1].dedup_key, "d2");
}

#[tokio::test]
async fn republishing_the_same_dedup_key_is_suppressed() {
    let queue = InMemoryQueue::new();
    queue.publish(Destination::AuthRequestQueue, msg("d1", "ar-1")).await.unwrap();
    queue.publish(Destination::AuthRequestQueue, msg("d1", "ar-1")).await.unwrap();

    let batch = queue.receive(Destination::AuthRequestQueue, 10, std::time::Duration::from_millis(10)).await.unwrap();
    assert_eq!(batch.len(), 1);
}

#[tokio::test]
async fn receive_does_not_cross_destinations() {
    let queue = InMemoryQueue::new();
    queue.publish(Destination::AuthRequestQueue, msg("d1", "ar-1")).await.unwrap();
    queue.publish(Destination::SettlementNotifications, msg("d2", "ar-1")).await.unwrap();

    let batch = queue.receive(Destination::AuthRequestQueue, 10, std::time::Duration::from_millis(10)).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].dedup_key, "d1");
}
