use super::*;
use crate::model::Action;

#[tokio::test]
async fn test_publisher_assigns_offsets_in_order() {
    let (publisher, mut transport) = channel_transport(8);

    assert_eq!(publisher.send("ls_node", b"{}".to_vec()).await.unwrap(), 0);
    assert_eq!(publisher.send("ls_link", b"{}".to_vec()).await.unwrap(), 1);

    let first = transport.receive().await.unwrap().unwrap();
    let second = transport.receive().await.unwrap().unwrap();
    assert_eq!((first.topic.as_str(), first.offset), ("ls_node", 0));
    assert_eq!((second.topic.as_str(), second.offset), ("ls_link", 1));
}

#[tokio::test]
async fn test_transport_ends_when_publishers_dropped() {
    let (publisher, mut transport) = channel_transport(8);
    publisher.send("peer", b"{}".to_vec()).await.unwrap();
    drop(publisher);

    assert!(transport.receive().await.unwrap().is_some());
    assert!(transport.receive().await.unwrap().is_none());
}

#[tokio::test]
async fn test_ack_is_recorded() {
    let (publisher, mut transport) = channel_transport(8);
    let log = transport.ack_log();
    publisher.send("peer", b"{}".to_vec()).await.unwrap();

    let message = transport.receive().await.unwrap().unwrap();
    transport.ack(&message).await.unwrap();

    assert_eq!(*log.read().await, vec![0]);
}

#[tokio::test]
async fn test_send_to_closed_transport_fails() {
    let (publisher, transport) = channel_transport(1);
    drop(transport);
    let err = publisher.send("peer", vec![]).await.unwrap_err();
    assert!(matches!(err, BusError::Closed));
}

#[tokio::test]
async fn test_notifier_broadcasts_to_subscribers() {
    let notifier = ChannelNotifier::new();
    let mut rx = notifier.subscribe();

    let notification = Notification::new("k", "ls_node/k", Action::Add);
    notifier.publish(&notification).await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), notification);
}

#[tokio::test]
async fn test_notifier_without_subscribers_succeeds() {
    let notifier = ChannelNotifier::new();
    let notification = Notification::new("k", "ls_node/k", Action::Del);
    assert!(notifier.publish(&notification).await.is_ok());
}
