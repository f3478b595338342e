//! End-to-end flows through the directory, rooms and connections.
//!
//! These tests drive the actor system exactly the way the gateway does:
//! register a connection, join, exchange events, disconnect. No sockets are
//! involved; each test client holds the receiving end of its transport
//! channel.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use rc_test_utils::TestDirectory;
use room_controller::attendance::AttendanceStatus;
use room_controller::events::ServerEvent;
use serde_json::json;

#[tokio::test]
async fn test_two_party_room_lifecycle() {
    let dir = TestDirectory::spawn();
    let mut alice = dir.connect("conn-a").await;
    let mut bob = dir.connect("conn-b").await;

    // A joins and becomes owner.
    let summary = dir
        .handle
        .join(
            "r1".to_string(),
            "conn-a".to_string(),
            Some("u-a".to_string()),
            Some("Alice".to_string()),
            false,
        )
        .await
        .unwrap();
    assert!(summary.is_new_owner);

    // B joins; both receive the arrival with membership [A, B].
    dir.handle
        .join(
            "r1".to_string(),
            "conn-b".to_string(),
            Some("u-b".to_string()),
            Some("Bob".to_string()),
            false,
        )
        .await
        .unwrap();
    dir.settle().await;

    let expected_members = vec!["conn-a".to_string(), "conn-b".to_string()];
    for (client, label) in [(&mut alice, "alice"), (&mut bob, "bob")] {
        let events = client.drain();
        let arrived = events
            .iter()
            .find_map(|e| match e {
                ServerEvent::ParticipantArrived {
                    connection_id,
                    members,
                } if connection_id == "conn-b" => Some(members.clone()),
                _ => None,
            })
            .unwrap_or_else(|| panic!("{label} missed the arrival"));
        assert_eq!(arrived, expected_members);
    }

    // B sends chat; both receive it tagged with B as sender.
    dir.handle
        .chat("conn-b".to_string(), "Bob".to_string(), "hi".to_string())
        .await
        .unwrap();
    dir.settle().await;

    for client in [&mut alice, &mut bob] {
        let events = client.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::Chat { sender, body, origin_connection_id }
                if sender == "Bob" && body == "hi" && origin_connection_id == "conn-b"
        )));
    }

    // A disconnects; B is notified and the room persists with B only.
    dir.disconnect(&alice).await;
    dir.settle().await;

    let events = bob.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::ParticipantLeft { connection_id } if connection_id == "conn-a"
    )));

    let status = dir.handle.get_status().await.unwrap();
    assert_eq!(status.room_count, 1);
    assert_eq!(status.attached_connections, 1);

    dir.handle.cancel();
}

#[tokio::test]
async fn test_late_joiner_gets_full_chat_replay_before_new_messages() {
    let dir = TestDirectory::spawn();
    let _alice = dir.connect("conn-a").await;
    let mut carol = dir.connect("conn-c").await;

    dir.handle
        .join(
            "r2".to_string(),
            "conn-a".to_string(),
            Some("u-a".to_string()),
            None,
            false,
        )
        .await
        .unwrap();

    for body in ["one", "two", "three"] {
        dir.handle
            .chat("conn-a".to_string(), "Alice".to_string(), body.to_string())
            .await
            .unwrap();
    }
    dir.settle().await;

    dir.handle
        .join(
            "r2".to_string(),
            "conn-c".to_string(),
            Some("u-c".to_string()),
            None,
            false,
        )
        .await
        .unwrap();
    dir.handle
        .chat("conn-a".to_string(), "Alice".to_string(), "four".to_string())
        .await
        .unwrap();
    dir.settle().await;

    let bodies: Vec<String> = carol
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            ServerEvent::Chat { body, .. } => Some(body),
            _ => None,
        })
        .collect();
    assert_eq!(bodies, vec!["one", "two", "three", "four"]);

    dir.handle.cancel();
}

#[tokio::test]
async fn test_attendance_classification_from_samples() {
    let dir = TestDirectory::spawn();
    let mut alice = dir.connect("conn-a").await;
    let mut bob = dir.connect("conn-b").await;
    let mut carol = dir.connect("conn-c").await;

    for (conn, user) in [("conn-a", "u-a"), ("conn-b", "u-b"), ("conn-c", "u-c")] {
        dir.handle
            .join(
                "r3".to_string(),
                conn.to_string(),
                Some(user.to_string()),
                None,
                false,
            )
            .await
            .unwrap();
    }

    // Ten samples each at the 10s interval: total 100s per participant.
    // u-a: 75s verified (Present), u-b: 50s (Partial), u-c: 49s (Absent).
    for i in 0..10u64 {
        dir.handle
            .presence_sample(
                "r3".to_string(),
                "u-a".to_string(),
                None,
                if i < 5 { 15 } else { 0 },
            )
            .await
            .unwrap();
        dir.handle
            .presence_sample("r3".to_string(), "u-b".to_string(), None, 5)
            .await
            .unwrap();
        dir.handle
            .presence_sample(
                "r3".to_string(),
                "u-c".to_string(),
                None,
                if i == 0 { 49 } else { 0 },
            )
            .await
            .unwrap();
    }
    dir.settle().await;

    dir.handle.end_meeting("r3".to_string()).await.unwrap();
    dir.settle().await;

    let reports = dir.sink.reports();
    assert_eq!(reports.len(), 1);
    let report = reports.first().unwrap();
    assert_eq!(report.meeting_id, "r3");
    assert_eq!(report.owner_id, "u-a");

    let by_user = |id: &str| {
        report
            .participants
            .iter()
            .find(|p| p.user_id == id)
            .unwrap()
    };
    assert_eq!(by_user("u-a").verified_percent, 75);
    assert_eq!(by_user("u-a").status, AttendanceStatus::Present);
    assert_eq!(by_user("u-b").verified_percent, 50);
    assert_eq!(by_user("u-b").status, AttendanceStatus::Partial);
    assert_eq!(by_user("u-c").verified_percent, 49);
    assert_eq!(by_user("u-c").status, AttendanceStatus::Absent);

    // Everyone received the broadcast; only the owner the annotated copy.
    for (client, is_owner) in [(&mut alice, true), (&mut bob, false), (&mut carol, false)] {
        let events = client.drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::AttendanceReport { .. })));
        assert_eq!(
            events
                .iter()
                .any(|e| matches!(e, ServerEvent::OwnerAttendanceReport { .. })),
            is_owner
        );
    }

    dir.handle.cancel();
}

#[tokio::test]
async fn test_end_meeting_is_idempotent() {
    let dir = TestDirectory::spawn();
    let mut alice = dir.connect("conn-a").await;

    dir.handle
        .join(
            "r4".to_string(),
            "conn-a".to_string(),
            Some("u-a".to_string()),
            None,
            false,
        )
        .await
        .unwrap();
    dir.settle().await;
    alice.drain();

    dir.handle.end_meeting("r4".to_string()).await.unwrap();
    dir.handle.end_meeting("r4".to_string()).await.unwrap();
    dir.settle().await;

    assert_eq!(dir.sink.reports().len(), 1);
    let report_events = alice
        .drain()
        .iter()
        .filter(|e| matches!(e, ServerEvent::AttendanceReport { .. }))
        .count();
    assert_eq!(report_events, 1);

    // Descriptor cleanup was instructed exactly once.
    assert!(dir.sink.descriptors_deleted("r4"));

    dir.handle.cancel();
}

#[tokio::test]
async fn test_end_meeting_after_room_emptied_is_noop() {
    let dir = TestDirectory::spawn();
    let alice = dir.connect("conn-a").await;

    dir.handle
        .join(
            "r5".to_string(),
            "conn-a".to_string(),
            Some("u-a".to_string()),
            None,
            false,
        )
        .await
        .unwrap();
    dir.disconnect(&alice).await;
    dir.settle().await;

    dir.handle.end_meeting("r5".to_string()).await.unwrap();
    dir.settle().await;

    assert!(dir.sink.reports().is_empty());

    dir.handle.cancel();
}

#[tokio::test]
async fn test_report_broadcast_survives_sink_failure() {
    let dir = TestDirectory::spawn();
    let mut alice = dir.connect("conn-a").await;

    dir.handle
        .join(
            "r6".to_string(),
            "conn-a".to_string(),
            Some("u-a".to_string()),
            None,
            false,
        )
        .await
        .unwrap();
    dir.settle().await;
    alice.drain();

    dir.sink.set_failing(true);
    dir.handle.end_meeting("r6".to_string()).await.unwrap();
    dir.settle().await;

    // Storage failed, but the participants still got their result.
    assert!(dir.sink.reports().is_empty());
    assert!(alice
        .drain()
        .iter()
        .any(|e| matches!(e, ServerEvent::AttendanceReport { .. })));

    dir.handle.cancel();
}

#[tokio::test]
async fn test_signal_relay_between_connections() {
    let dir = TestDirectory::spawn();
    let mut alice = dir.connect("conn-a").await;
    let mut bob = dir.connect("conn-b").await;

    // Relay needs no room membership at all.
    dir.registry
        .relay("conn-a", "conn-b", json!({"kind": "offer", "sdp": "v=0"}))
        .await;

    let event = bob.next_event().await;
    match event {
        ServerEvent::Signal { from, payload } => {
            assert_eq!(from, "conn-a");
            assert_eq!(
                payload.get("kind").and_then(|v| v.as_str()),
                Some("offer")
            );
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // After B disconnects, the same relay is a silent no-op.
    dir.disconnect(&bob).await;
    dir.registry
        .relay("conn-a", "conn-b", json!({"kind": "candidate"}))
        .await;
    dir.settle().await;
    assert!(alice.drain().is_empty());

    dir.handle.cancel();
}

#[tokio::test]
async fn test_face_registration_enables_sampling() {
    let dir = TestDirectory::spawn();
    let mut alice = dir.connect("conn-a").await;

    // Join anonymously; samples for the future identity are dropped.
    dir.handle
        .join("r7".to_string(), "conn-a".to_string(), None, None, false)
        .await
        .unwrap();
    dir.handle
        .presence_sample("r7".to_string(), "u-a".to_string(), None, 10)
        .await
        .unwrap();
    dir.settle().await;

    // Enroll, then sample again.
    dir.handle
        .register_face(
            "conn-a".to_string(),
            "r7".to_string(),
            "u-a".to_string(),
            json!([0.12, 0.34]),
        )
        .await
        .unwrap();
    dir.handle
        .presence_sample(
            "r7".to_string(),
            "u-a".to_string(),
            Some("Alice".to_string()),
            10,
        )
        .await
        .unwrap();
    dir.settle().await;

    assert!(alice
        .drain()
        .iter()
        .any(|e| matches!(e, ServerEvent::FaceRegistered)));
    assert_eq!(dir.sink.descriptor_saves("r7"), 1);

    dir.handle.end_meeting("r7".to_string()).await.unwrap();
    dir.settle().await;

    // Only the post-enrollment sample counted.
    let reports = dir.sink.reports();
    let row = reports
        .first()
        .and_then(|r| r.participants.first())
        .unwrap();
    assert_eq!(row.user_id, "u-a");
    assert_eq!(row.name, "Alice");
    assert_eq!(row.total_time_seconds, 10);
    assert_eq!(row.verified_time_seconds, 10);

    dir.handle.cancel();
}

#[tokio::test]
async fn test_live_attendance_reaches_owner_only() {
    let dir = TestDirectory::spawn();
    let mut alice = dir.connect("conn-a").await;
    let mut bob = dir.connect("conn-b").await;

    dir.handle
        .join(
            "r8".to_string(),
            "conn-a".to_string(),
            Some("u-a".to_string()),
            None,
            false,
        )
        .await
        .unwrap();
    dir.handle
        .join(
            "r8".to_string(),
            "conn-b".to_string(),
            Some("u-b".to_string()),
            None,
            false,
        )
        .await
        .unwrap();
    dir.settle().await;
    alice.drain();
    bob.drain();

    dir.handle
        .presence_sample("r8".to_string(), "u-b".to_string(), None, 10)
        .await
        .unwrap();
    dir.settle().await;

    let snapshots: Vec<_> = alice
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            ServerEvent::LiveAttendance { participants } => Some(participants),
            _ => None,
        })
        .collect();
    assert_eq!(snapshots.len(), 1);
    let snapshot = snapshots.first().unwrap();
    assert_eq!(snapshot.len(), 2);

    assert!(!bob
        .drain()
        .iter()
        .any(|e| matches!(e, ServerEvent::LiveAttendance { .. })));

    dir.handle.cancel();
}
