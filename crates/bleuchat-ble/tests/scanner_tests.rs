//! Central-role scenarios: discovery, hello exchange, notifications and links

mod common;

use std::collections::HashSet;
use std::time::Duration;

use bleuchat_ble::DeviceId;
use bleuchat_core::{Hello, LinkState, MessageEnvelope, MessageKind, RoomUpdate, Timestamp};
use common::{alice, bob, local_peer, settle, TestRoom};
use tokio_test::assert_ok;

#[tokio::test]
async fn test_alice_joins_chats_and_leaves() {
    let mut t = TestRoom::start();
    t.central.add_advertiser("dev-alice", &Hello::new(alice(), "Alice"));

    assert_ok!(t.room.scanner().start_scanning(None).await);
    assert_eq!(t.next_update().await, RoomUpdate::ScanStarted);
    assert!(t.central.is_scanning());

    t.central.discover("dev-alice");
    assert_eq!(
        t.next_update().await,
        RoomUpdate::PeerJoined {
            name: "Alice".to_string(),
            peer: alice()
        }
    );
    match t.next_update().await {
        RoomUpdate::Message(status) => {
            assert_eq!(status.kind, MessageKind::Joined);
            assert_eq!(status.sender_id, alice());
        }
        other => panic!("expected joined status, got {:?}", other),
    }

    // Our hello went the other way
    let written = t.central.written_hellos("dev-alice");
    assert_eq!(written, vec![Hello::new(local_peer(), "Me")]);
    assert_eq!(
        t.room
            .scanner()
            .link_state(&DeviceId::from("dev-alice"))
            .await,
        Some(LinkState::Subscribed)
    );

    let hi = MessageEnvelope::chat(alice(), "Alice", "hi everyone, nice to see you", Timestamp::new(5));
    t.central.deliver("dev-alice", &hi, 23);
    assert_eq!(t.next_update().await, RoomUpdate::Message(hi));

    t.central.lose_link("dev-alice");
    match t.next_update().await {
        RoomUpdate::Message(status) => assert_eq!(status.kind, MessageKind::Left),
        other => panic!("expected left status, got {:?}", other),
    }
    assert_eq!(t.next_update().await, RoomUpdate::PeerLeft { peer: alice() });
    assert!(t.room.scanner().connected_peers().await.is_empty());
}

#[tokio::test]
async fn test_failed_connect_is_not_retried() {
    let mut t = TestRoom::start();
    t.central.add_advertiser("dev-bob", &Hello::new(bob(), "Bob"));
    t.central.fail_connect("dev-bob");

    assert_ok!(t.room.scanner().start_scanning(None).await);
    assert_eq!(t.next_update().await, RoomUpdate::ScanStarted);

    t.central.discover("dev-bob");
    settle().await;
    assert_eq!(t.central.connect_attempts("dev-bob"), 1);
    assert_eq!(
        t.room.scanner().link_state(&DeviceId::from("dev-bob")).await,
        None
    );

    // Outside a window the device is not tried again
    t.room.scanner().stop_scanning().await;
    assert_eq!(t.next_update().await, RoomUpdate::ScanFinished);
    t.central.discover("dev-bob");
    settle().await;
    assert_eq!(t.central.connect_attempts("dev-bob"), 1);

    // A later window may rediscover it
    assert_ok!(t.room.scanner().start_scanning(None).await);
    t.central.discover("dev-bob");
    settle().await;
    assert_eq!(t.central.connect_attempts("dev-bob"), 2);
    assert!(t.central.written_hellos("dev-bob").is_empty());
}

#[tokio::test]
async fn test_failed_device_waits_for_next_window() {
    let mut t = TestRoom::start();
    t.central.add_advertiser("dev-bob", &Hello::new(bob(), "Bob"));
    t.central.fail_connect("dev-bob");

    assert_ok!(t.room.scanner().start_scanning(None).await);
    assert_eq!(t.next_update().await, RoomUpdate::ScanStarted);

    // A flapping advertiser keeps showing up in the same window
    for _ in 0..3 {
        t.central.discover("dev-bob");
        settle().await;
    }
    assert_eq!(t.central.connect_attempts("dev-bob"), 1);
    assert!(t.room.scanner().is_scanning().await);

    // Re-arming an open window does not clear the failure
    assert_ok!(t.room.scanner().start_scanning(None).await);
    t.central.discover("dev-bob");
    settle().await;
    assert_eq!(t.central.connect_attempts("dev-bob"), 1);
}

#[tokio::test]
async fn test_stop_scanning_keeps_links() {
    let mut t = TestRoom::start();
    t.central.add_advertiser("dev-alice", &Hello::new(alice(), "Alice"));

    assert_ok!(t.room.scanner().start_scanning(None).await);
    t.central.discover("dev-alice");
    t.wait_for(|u| matches!(u, RoomUpdate::Message(m) if m.kind == MessageKind::Joined))
        .await;

    t.room.scanner().stop_scanning().await;
    assert_eq!(t.next_update().await, RoomUpdate::ScanFinished);
    t.assert_quiet().await;

    assert_eq!(t.room.scanner().connected_peers().await, vec![alice()]);
    assert!(!t.central.was_disconnected("dev-alice"));
    assert_eq!(
        t.room.scanner().link_state(&DeviceId::from("dev-alice")).await,
        Some(LinkState::Subscribed)
    );

    // The link still carries messages
    let hi = MessageEnvelope::chat(alice(), "Alice", "still here", Timestamp::new(9));
    t.central.deliver("dev-alice", &hi, 23);
    assert_eq!(t.next_update().await, RoomUpdate::Message(hi));
}

#[tokio::test]
async fn test_start_scanning_twice_reports_once() {
    let mut t = TestRoom::start();

    assert_ok!(t.room.scanner().start_scanning(None).await);
    assert_ok!(t.room.scanner().start_scanning(None).await);
    assert_eq!(t.next_update().await, RoomUpdate::ScanStarted);
    assert_eq!(t.central.scan_starts(), 1);
    t.assert_quiet().await;
}

#[tokio::test(start_paused = true)]
async fn test_scan_window_expiry_keeps_links() {
    let mut t = TestRoom::start();
    t.central.add_advertiser("dev-alice", &Hello::new(alice(), "Alice"));

    assert_ok!(
        t.room
            .scanner()
            .start_scanning(Some(Duration::from_secs(8)))
            .await
    );
    t.central.discover("dev-alice");
    t.wait_for(|u| matches!(u, RoomUpdate::PeerJoined { .. })).await;

    tokio::time::sleep(Duration::from_secs(9)).await;
    t.wait_for(|u| *u == RoomUpdate::ScanFinished).await;

    assert!(!t.room.scanner().is_scanning().await);
    assert!(!t.central.is_scanning());
    assert_eq!(t.room.scanner().connected_peers().await, vec![alice()]);
    assert!(!t.central.was_disconnected("dev-alice"));

    let snapshot = t.room.snapshot().await.unwrap();
    assert_eq!(snapshot.room_size, 2);
}

#[tokio::test]
async fn test_own_advertisement_is_dropped() {
    let mut t = TestRoom::start();
    t.central.add_advertiser("dev-self", &Hello::new(local_peer(), "Me"));

    assert_ok!(t.room.scanner().start_scanning(None).await);
    assert_eq!(t.next_update().await, RoomUpdate::ScanStarted);

    t.central.discover("dev-self");
    t.assert_quiet().await;
    assert!(t.room.scanner().connected_peers().await.is_empty());
    assert!(t.central.was_disconnected("dev-self"));
}

#[tokio::test]
async fn test_disconnect_all_reports_every_peer() {
    let mut t = TestRoom::start();
    t.central.add_advertiser("dev-alice", &Hello::new(alice(), "Alice"));
    t.central.add_advertiser("dev-bob", &Hello::new(bob(), "Bob"));

    assert_ok!(t.room.scanner().start_scanning(None).await);
    t.central.discover("dev-alice");
    t.central.discover("dev-bob");
    let mut joined = HashSet::new();
    while joined.len() < 2 {
        if let RoomUpdate::PeerJoined { peer, .. } = t.next_update().await {
            joined.insert(peer);
        }
    }

    t.room.scanner().disconnect_all().await;
    let mut left = HashSet::new();
    while left.len() < 2 {
        if let RoomUpdate::PeerLeft { peer } = t.next_update().await {
            left.insert(peer);
        }
    }
    assert_eq!(left, HashSet::from([alice(), bob()]));

    assert!(t.central.was_disconnected("dev-alice"));
    assert!(t.central.was_disconnected("dev-bob"));
    assert!(!t.room.scanner().is_scanning().await);
    assert_eq!(t.room.snapshot().await.unwrap().room_size, 1);
}
