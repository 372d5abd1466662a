//! Peripheral-role scenarios: advertising sessions, subscribers and fan-out

mod common;

use std::time::Duration;

use bleuchat_core::{BleuchatError, FragmentError, Hello, MessageKind, RoomUpdate};
use common::{alice, bob, local_peer, settle, TestRoom};
use tokio_test::assert_ok;

/// Start advertising and let two centrals join
async fn room_with_two_subscribers() -> TestRoom {
    let mut t = TestRoom::start();
    assert_ok!(t.room.broadcaster().start_advertising(None).await);
    t.peripheral.connect_central("dev-bob", &Hello::new(bob(), "Bob"));
    t.peripheral.connect_central("dev-alice", &Hello::new(alice(), "Alice"));

    t.wait_for(|u| *u == RoomUpdate::PeerJoined { name: "Bob".into(), peer: bob() })
        .await;
    t.wait_for(|u| *u == RoomUpdate::PeerJoined { name: "Alice".into(), peer: alice() })
        .await;
    assert!(matches!(
        t.next_update().await,
        RoomUpdate::Message(m) if m.kind == MessageKind::Joined
    ));
    t
}

#[tokio::test]
async fn test_advertises_session_hello() {
    let t = TestRoom::start();
    assert_ok!(t.room.broadcaster().start_advertising(None).await);

    assert!(t.peripheral.is_advertising());
    assert_eq!(
        t.peripheral.adverts(),
        vec![(Hello::new(local_peer(), "Me"), "Me".to_string())]
    );
}

#[tokio::test]
async fn test_message_reaches_every_subscriber() {
    let mut t = room_with_two_subscribers().await;

    let sent = assert_ok!(t.room.send_message("  morning all, coffee is on  ").await);
    assert_eq!(sent.body, "morning all, coffee is on");
    assert_eq!(sent.sender_id, local_peer());

    for device in ["dev-alice", "dev-bob"] {
        assert!(t.peripheral.delivered(device).len() > 1);
        assert!(t.peripheral.delivered(device).iter().all(|f| f.len() <= 23));
        assert_eq!(t.peripheral.received_envelopes(device), vec![sent.clone()]);
    }

    match t.next_update().await {
        RoomUpdate::Message(local) => {
            assert!(local.is_self);
            assert_eq!(local.body, sent.body);
        }
        other => panic!("expected local message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_subscriber_dropped_mid_message() {
    let mut t = room_with_two_subscribers().await;
    t.peripheral.fail_writes_after("dev-alice", 1);

    let sent = assert_ok!(
        t.room
            .send_message("this message is long enough to need several fragments")
            .await
    );

    // Bob still gets the whole message
    assert_eq!(t.peripheral.received_envelopes("dev-bob"), vec![sent]);
    assert_eq!(t.peripheral.delivered("dev-alice").len(), 1);

    match t.next_update().await {
        RoomUpdate::Message(status) => {
            assert_eq!(status.kind, MessageKind::Left);
            assert_eq!(status.sender_id, alice());
        }
        other => panic!("expected left status, got {:?}", other),
    }
    assert_eq!(t.next_update().await, RoomUpdate::PeerLeft { peer: alice() });
    assert!(matches!(t.next_update().await, RoomUpdate::Message(m) if m.is_self));
    assert_eq!(t.room.broadcaster().subscribers().await, vec![bob()]);
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let mut t = room_with_two_subscribers().await;

    let result = t.room.send_message(" \t\n ").await;
    assert!(matches!(result, Err(BleuchatError::EmptyMessage)));
    assert!(t.peripheral.delivered("dev-bob").is_empty());
    t.assert_quiet().await;
}

#[tokio::test]
async fn test_oversized_message_rejected_before_sending() {
    let mut t = room_with_two_subscribers().await;

    let result = t.room.send_message(&"x".repeat(5000)).await;
    assert!(matches!(
        result,
        Err(BleuchatError::Fragment(FragmentError::PayloadTooLarge { max: 4096, .. }))
    ));
    assert!(t.peripheral.delivered("dev-bob").is_empty());
    assert!(t.peripheral.delivered("dev-alice").is_empty());
    t.assert_quiet().await;
    assert!(t.room.snapshot().await.unwrap().history.iter().all(|m| !m.is_self));

    // Shorter messages still go out
    let sent = assert_ok!(t.room.send_message("short one").await);
    assert_eq!(t.peripheral.received_envelopes("dev-bob"), vec![sent]);
}

#[tokio::test]
async fn test_subscriber_without_hello_is_not_announced() {
    let mut t = TestRoom::start();
    assert_ok!(t.room.broadcaster().start_advertising(None).await);

    t.peripheral.unsubscribe("dev-ghost");
    t.peripheral
        .write_hello("dev-late", &Hello::new(bob(), "Bob"));
    t.assert_quiet().await;
    assert_eq!(t.room.broadcaster().subscriber_count().await, 0);
}

#[tokio::test]
async fn test_rewritten_hello_renames_subscriber() {
    let mut t = room_with_two_subscribers().await;

    t.peripheral
        .write_hello("dev-bob", &Hello::new(bob(), "Robert"));
    match t.next_update().await {
        RoomUpdate::Message(status) => {
            assert_eq!(status.kind, MessageKind::Renamed);
            assert_eq!(status.display_name, "Bob");
            assert!(status.body.ends_with("Robert"));
        }
        other => panic!("expected rename status, got {:?}", other),
    }

    let snapshot = t.room.snapshot().await.unwrap();
    assert_eq!(snapshot.peer(&bob()).unwrap().display_name, "Robert");
}

#[tokio::test]
async fn test_stop_advertising_drops_subscribers() {
    let mut t = room_with_two_subscribers().await;

    t.room.broadcaster().stop_advertising().await;
    assert!(!t.peripheral.is_advertising());

    let mut left = Vec::new();
    while left.len() < 2 {
        if let RoomUpdate::PeerLeft { peer } = t.next_update().await {
            left.push(peer);
        }
    }
    left.sort();
    let mut expected = vec![alice(), bob()];
    expected.sort();
    assert_eq!(left, expected);
    assert_eq!(t.room.broadcaster().subscriber_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_advertise_window_expiry_keeps_subscribers() {
    let mut t = TestRoom::start();
    assert_ok!(
        t.room
            .broadcaster()
            .start_advertising(Some(Duration::from_secs(8)))
            .await
    );
    t.peripheral.connect_central("dev-bob", &Hello::new(bob(), "Bob"));
    t.wait_for(|u| matches!(u, RoomUpdate::PeerJoined { .. })).await;

    tokio::time::sleep(Duration::from_secs(9)).await;
    settle().await;
    assert!(!t.peripheral.is_advertising());
    assert!(!t.room.broadcaster().is_advertising().await);
    assert_eq!(t.room.broadcaster().subscribers().await, vec![bob()]);

    // Still reachable after the window
    assert_ok!(t.room.send_message("still here").await);
    assert_eq!(t.peripheral.received_envelopes("dev-bob").len(), 1);
}

#[tokio::test]
async fn test_display_name_read_once_per_session() {
    let t = TestRoom::start();
    assert_ok!(t.room.broadcaster().start_advertising(None).await);

    t.identity.set_display_name("Renamed");
    assert_ok!(t.room.broadcaster().start_advertising(None).await);
    assert_eq!(t.peripheral.adverts().len(), 1);

    let sent = assert_ok!(t.room.send_message("who am i").await);
    assert_eq!(sent.display_name, "Me");

    t.room.broadcaster().stop_advertising().await;
    assert_ok!(t.room.broadcaster().start_advertising(None).await);
    let adverts = t.peripheral.adverts();
    assert_eq!(adverts.len(), 2);
    assert_eq!(adverts[1].0.display_name, "Renamed");
}
