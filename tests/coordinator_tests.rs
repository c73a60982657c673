mod common;

use common::Harness;
use voxroom::directory::RoomDirectory;
use voxroom::error::AppError;
use voxroom::models::RoomStatus;
use voxroom::ws::ServerEvent;

#[tokio::test]
async fn offline_member_connect_chat_disconnect() {
    let h = Harness::new();

    // Room with durable member A, currently offline.
    let room_id = h.create_room("u-a", "alice", 2).await;
    h.member(&room_id, "u-a", "alice").await;

    // A connects and joins at the socket layer.
    let mut a = h.connect("conn-a", "u-a", "alice");
    h.coordinator.join("conn-a", &room_id).await.unwrap();

    match a.next() {
        Some(ServerEvent::RoomJoined { participants, .. }) => {
            assert_eq!(participants.len(), 1);
            assert_eq!(participants[0].identity, "u-a");
            assert_eq!(participants[0].conn_id.as_deref(), Some("conn-a"));
        }
        other => panic!("expected room-joined, got {:?}", other),
    }

    // B joins durably through the directory, then connects.
    h.member(&room_id, "u-b", "bob").await;
    let mut b = h.connect("conn-b", "u-b", "bob");
    h.coordinator.join("conn-b", &room_id).await.unwrap();

    // B's snapshot reflects the state after its own durable write.
    match b.next() {
        Some(ServerEvent::RoomJoined { participants, .. }) => {
            let ids: Vec<_> = participants.iter().map(|p| p.identity.as_str()).collect();
            assert!(ids.contains(&"u-a") && ids.contains(&"u-b"));
        }
        other => panic!("expected room-joined, got {:?}", other),
    }

    // A saw B arrive.
    match a.next() {
        Some(ServerEvent::ParticipantArrived {
            identity, conn_id, ..
        }) => {
            assert_eq!(identity, "u-b");
            assert_eq!(conn_id, "conn-b");
        }
        other => panic!("expected participant-arrived, got {:?}", other),
    }

    // Chat fan-out includes the sender.
    h.coordinator.chat("conn-a", &room_id, " hi ").await.unwrap();
    for conn in [&mut a, &mut b] {
        match conn.next() {
            Some(ServerEvent::ChatMessage { identity, text, .. }) => {
                assert_eq!(identity, "u-a");
                assert_eq!(text, "hi");
            }
            other => panic!("expected chat-message, got {:?}", other),
        }
    }

    // A disconnects: B is notified, A stays a durable member, offline.
    h.coordinator.disconnect("conn-a").await;
    match b.next() {
        Some(ServerEvent::ParticipantDepartedByDisconnect { identity, .. }) => {
            assert_eq!(identity, "u-a");
        }
        other => panic!("expected participant-departed-by-disconnect, got {:?}", other),
    }

    let room = h.directory.find(&room_id).await.unwrap().unwrap();
    let a_record = room.participant("u-a").unwrap();
    assert!(a_record.conn_id.is_none());
    assert!(h.registry.lookup("conn-a").is_none());
}

#[tokio::test]
async fn socket_join_requires_prior_durable_membership() {
    let h = Harness::new();
    let room_id = h.create_room("u-a", "alice", 5).await;

    let _c = h.connect("conn-c", "u-c", "carol");

    let err = h.coordinator.join("conn-c", &room_id).await.unwrap_err();
    assert!(matches!(err, AppError::NotMember(_)));

    let err = h.coordinator.join("conn-c", "no-such-room").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn private_room_socket_join_checks_membership_not_code() {
    let h = Harness::new();
    let room_id = h.create_private_room("u-a", "alice", "7F3A9B", 5).await;
    h.member(&room_id, "u-b", "bob").await;

    // The socket join carries no access code at all; membership suffices.
    let mut b = h.connect("conn-b", "u-b", "bob");
    h.coordinator.join("conn-b", &room_id).await.unwrap();
    assert!(matches!(b.next(), Some(ServerEvent::RoomJoined { .. })));

    // A non-member is still rejected, code or no code.
    let _c = h.connect("conn-c", "u-c", "carol");
    let err = h.coordinator.join("conn-c", &room_id).await.unwrap_err();
    assert!(matches!(err, AppError::NotMember(_)));
}

#[tokio::test]
async fn leave_is_idempotent_and_retains_membership() {
    let h = Harness::new();
    let room_id = h.create_room("u-a", "alice", 5).await;
    h.member(&room_id, "u-a", "alice").await;
    h.member(&room_id, "u-b", "bob").await;

    let mut a = h.connect("conn-a", "u-a", "alice");
    let mut b = h.connect("conn-b", "u-b", "bob");
    h.coordinator.join("conn-a", &room_id).await.unwrap();
    h.coordinator.join("conn-b", &room_id).await.unwrap();
    a.drain();
    b.drain();

    h.coordinator.leave("conn-a", &room_id).await.unwrap();

    assert!(matches!(
        b.next(),
        Some(ServerEvent::ParticipantDeparted { .. })
    ));
    assert_eq!(h.registry.current_room("conn-a"), None);

    let room = h.directory.find(&room_id).await.unwrap().unwrap();
    assert!(room.participant("u-a").unwrap().conn_id.is_none());

    // Second leave is a no-op, not an error; no further fan-out.
    h.coordinator.leave("conn-a", &room_id).await.unwrap();
    assert!(b.next().is_none());

    // Disconnecting an already-unscoped connection only unregisters it.
    h.coordinator.disconnect("conn-a").await;
    assert!(b.next().is_none());
    assert!(h.registry.lookup("conn-a").is_none());
}

#[tokio::test]
async fn events_while_unscoped_are_invalid_state() {
    let h = Harness::new();
    let room_id = h.create_room("u-a", "alice", 5).await;
    h.member(&room_id, "u-a", "alice").await;

    let _a = h.connect("conn-a", "u-a", "alice");

    let err = h
        .coordinator
        .chat("conn-a", &room_id, "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let err = h
        .coordinator
        .typing("conn-a", &room_id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn typing_excludes_sender_and_chat_includes_sender() {
    let h = Harness::new();
    let room_id = h.create_room("u-a", "alice", 5).await;
    for (id, name) in [("u-a", "alice"), ("u-b", "bob"), ("u-c", "carol")] {
        h.member(&room_id, id, name).await;
    }

    let mut a = h.connect("conn-a", "u-a", "alice");
    let mut b = h.connect("conn-b", "u-b", "bob");
    let mut c = h.connect("conn-c", "u-c", "carol");
    for conn in ["conn-a", "conn-b", "conn-c"] {
        h.coordinator.join(conn, &room_id).await.unwrap();
    }
    a.drain();
    b.drain();
    c.drain();

    h.coordinator.typing("conn-a", &room_id, true).await.unwrap();
    assert!(a.next().is_none());
    assert!(matches!(b.next(), Some(ServerEvent::UserTyping { .. })));
    assert!(matches!(c.next(), Some(ServerEvent::UserTyping { .. })));

    h.coordinator.chat("conn-a", &room_id, "hi").await.unwrap();
    for conn in [&mut a, &mut b, &mut c] {
        let events = conn.drain();
        let chats = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::ChatMessage { .. }))
            .count();
        assert_eq!(chats, 1, "exactly one chat-message per scoped connection");
    }
}

#[tokio::test]
async fn status_change_is_creator_only_and_validated() {
    let h = Harness::new();
    let room_id = h.create_room("u-a", "alice", 5).await;
    h.member(&room_id, "u-a", "alice").await;
    h.member(&room_id, "u-b", "bob").await;

    let mut a = h.connect("conn-a", "u-a", "alice");
    let mut b = h.connect("conn-b", "u-b", "bob");
    h.coordinator.join("conn-a", &room_id).await.unwrap();
    h.coordinator.join("conn-b", &room_id).await.unwrap();
    a.drain();
    b.drain();

    let err = h
        .coordinator
        .status_change("conn-b", &room_id, "Inactive")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = h
        .coordinator
        .status_change("conn-a", &room_id, "Paused")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidValue(_)));

    h.coordinator
        .status_change("conn-a", &room_id, "Inactive")
        .await
        .unwrap();

    for conn in [&mut a, &mut b] {
        assert!(matches!(
            conn.next(),
            Some(ServerEvent::RoomStatusUpdated {
                status: RoomStatus::Inactive
            })
        ));
    }

    let room = h.directory.find(&room_id).await.unwrap().unwrap();
    assert_eq!(room.status, RoomStatus::Inactive);
}

#[tokio::test]
async fn concurrent_durable_joins_converge_at_capacity() {
    let h = Harness::new();
    let room_id = h.create_room("u-creator", "creator", 5).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let directory = h.directory.clone();
        let room_id = room_id.clone();
        handles.push(tokio::spawn(async move {
            directory
                .insert_participant(
                    &room_id,
                    voxroom::models::Participant::new(&format!("u-{i}"), &format!("user{i}")),
                )
                .await
        }));
    }

    let mut admitted = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(AppError::RoomFull) => full += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(admitted, 5);
    assert_eq!(full, 3);

    let room = h.directory.find(&room_id).await.unwrap().unwrap();
    assert_eq!(room.participants.len(), 5);
    assert!(room.participants.len() <= room.capacity as usize);
}

#[tokio::test]
async fn near_simultaneous_socket_joiners_see_each_other() {
    let h = Harness::new();
    let room_id = h.create_room("u-a", "alice", 5).await;
    h.member(&room_id, "u-a", "alice").await;
    h.member(&room_id, "u-b", "bob").await;

    let mut a = h.connect("conn-a", "u-a", "alice");
    let mut b = h.connect("conn-b", "u-b", "bob");

    let (ra, rb) = tokio::join!(
        h.coordinator.join("conn-a", &room_id),
        h.coordinator.join("conn-b", &room_id),
    );
    ra.unwrap();
    rb.unwrap();

    for (conn, other_conn) in [(&mut a, "conn-b"), (&mut b, "conn-a")] {
        let events = conn.drain();
        let snapshot_has_other = events.iter().any(|e| match e {
            ServerEvent::RoomJoined { participants, .. } => participants
                .iter()
                .any(|p| p.conn_id.as_deref() == Some(other_conn)),
            _ => false,
        });
        let saw_arrival = events.iter().any(|e| {
            matches!(e, ServerEvent::ParticipantArrived { conn_id, .. } if conn_id == other_conn)
        });
        assert!(
            snapshot_has_other || saw_arrival,
            "joiner must observe the other connection"
        );
    }
}

#[tokio::test]
async fn second_device_takes_over_participant_record() {
    let h = Harness::new();
    let room_id = h.create_room("u-a", "alice", 5).await;
    h.member(&room_id, "u-a", "alice").await;

    let mut first = h.connect("conn-1", "u-a", "alice");
    h.coordinator.join("conn-1", &room_id).await.unwrap();
    first.drain();

    // Same identity, second connection.
    let mut second = h.connect("conn-2", "u-a", "alice");
    h.coordinator.join("conn-2", &room_id).await.unwrap();
    second.drain();

    // The record follows the newer connection; the older one is unscoped.
    assert_eq!(h.registry.current_room("conn-1"), None);
    assert_eq!(h.registry.current_room("conn-2").as_deref(), Some(&*room_id));
    let room = h.directory.find(&room_id).await.unwrap().unwrap();
    assert_eq!(
        room.participant("u-a").unwrap().conn_id.as_deref(),
        Some("conn-2")
    );

    // The old socket's teardown must not undo the takeover.
    h.coordinator.disconnect("conn-1").await;
    let room = h.directory.find(&room_id).await.unwrap().unwrap();
    assert_eq!(
        room.participant("u-a").unwrap().conn_id.as_deref(),
        Some("conn-2")
    );
}

#[tokio::test]
async fn disconnect_tolerates_room_already_gone() {
    let h = Harness::new();
    let room_id = h.create_room("u-a", "alice", 5).await;
    h.member(&room_id, "u-a", "alice").await;

    let _a = h.connect("conn-a", "u-a", "alice");
    h.coordinator.join("conn-a", &room_id).await.unwrap();

    h.directory.delete(&room_id).await.unwrap();

    // Never raises, only logs; the connection is still unregistered.
    h.coordinator.disconnect("conn-a").await;
    assert!(h.registry.lookup("conn-a").is_none());
}

#[tokio::test]
async fn scope_always_matches_exactly_one_record() {
    let h = Harness::new();
    let room_id = h.create_room("u-a", "alice", 5).await;
    h.member(&room_id, "u-a", "alice").await;
    h.member(&room_id, "u-b", "bob").await;

    let _a = h.connect("conn-a", "u-a", "alice");
    let _b = h.connect("conn-b", "u-b", "bob");
    h.coordinator.join("conn-a", &room_id).await.unwrap();
    h.coordinator.join("conn-b", &room_id).await.unwrap();
    h.coordinator.leave("conn-b", &room_id).await.unwrap();

    let room = h.directory.find(&room_id).await.unwrap().unwrap();
    for conn_id in ["conn-a", "conn-b"] {
        match h.registry.current_room(conn_id) {
            Some(scoped) => {
                assert_eq!(scoped, room.room_id);
                let pointing: Vec<_> = room
                    .participants
                    .iter()
                    .filter(|p| p.conn_id.as_deref() == Some(conn_id))
                    .collect();
                assert_eq!(pointing.len(), 1);
            }
            None => {
                assert!(room
                    .participants
                    .iter()
                    .all(|p| p.conn_id.as_deref() != Some(conn_id)));
            }
        }
    }
}
