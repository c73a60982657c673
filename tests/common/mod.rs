#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::mpsc;

use voxroom::directory::{MemoryDirectory, RoomDirectory, RoomLocks};
use voxroom::models::{Participant, Room, Visibility};
use voxroom::ws::{
    ConnectionHandle, ConnectionRegistry, Coordinator, ServerEvent, SignalingRelay,
};

/// Coordinator wired to the in-memory directory, no transport attached.
pub struct Harness {
    pub directory: Arc<MemoryDirectory>,
    pub registry: Arc<ConnectionRegistry>,
    pub coordinator: Arc<Coordinator>,
    pub relay: SignalingRelay,
}

impl Harness {
    pub fn new() -> Self {
        let directory = Arc::new(MemoryDirectory::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let locks = Arc::new(RoomLocks::new());
        let coordinator = Arc::new(Coordinator::new(
            directory.clone() as Arc<dyn RoomDirectory>,
            registry.clone(),
            locks,
        ));
        let relay = SignalingRelay::new(registry.clone());

        Self {
            directory,
            registry,
            coordinator,
            relay,
        }
    }

    /// Create a room owned by `creator` and return its id.
    pub async fn create_room(&self, creator: &str, creator_name: &str, capacity: u32) -> String {
        let room = Room::new(
            "test room".into(),
            creator,
            creator_name,
            Visibility::Public,
            None,
            capacity,
        );
        let room_id = room.room_id.clone();
        self.directory.create(&room).await.unwrap();
        room_id
    }

    pub async fn create_private_room(
        &self,
        creator: &str,
        creator_name: &str,
        code: &str,
        capacity: u32,
    ) -> String {
        let room = Room::new(
            "private room".into(),
            creator,
            creator_name,
            Visibility::Private,
            Some(code.to_string()),
            capacity,
        );
        let room_id = room.room_id.clone();
        self.directory.create(&room).await.unwrap();
        room_id
    }

    /// Durable membership join, as the REST boundary would perform it.
    pub async fn member(&self, room_id: &str, identity: &str, username: &str) {
        self.directory
            .insert_participant(room_id, Participant::new(identity, username))
            .await
            .unwrap();
    }

    /// Register a live connection, as a completed handshake would.
    pub fn connect(&self, conn_id: &str, identity: &str, username: &str) -> TestConn {
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry.register(ConnectionHandle::new(
            conn_id.into(),
            identity.into(),
            username.into(),
            tx,
        ));
        TestConn {
            conn_id: conn_id.into(),
            rx,
        }
    }
}

/// Receiving side of one registered connection.
pub struct TestConn {
    pub conn_id: String,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl TestConn {
    pub fn next(&mut self) -> Option<ServerEvent> {
        self.rx.try_recv().ok()
    }

    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
