use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::ws::ServerEvent;

/// Handle for pushing events to one live connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub conn_id: String,
    pub identity: String,
    pub username: String,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(
        conn_id: String,
        identity: String,
        username: String,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            conn_id,
            identity,
            username,
            sender,
        }
    }

    /// Queue an event for delivery. Returns false when the connection's
    /// send loop is already gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

struct ConnectionEntry {
    handle: ConnectionHandle,
    current_room: Option<String>,
}

/// Volatile registry of live connections and their room scope. Process
/// lifetime only; authoritative for "currently connected", never for
/// durable membership. Owned by the coordinator, passed around by handle.
#[derive(Default)]
pub struct ConnectionRegistry {
    conns: DashMap<String, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            conns: DashMap::new(),
        }
    }

    /// Register a connection after a successful handshake.
    pub fn register(&self, handle: ConnectionHandle) {
        self.conns.insert(
            handle.conn_id.clone(),
            ConnectionEntry {
                handle,
                current_room: None,
            },
        );
    }

    /// Remove a connection. Callers run room cleanup first so no
    /// participant record points at the removed connection.
    pub fn unregister(&self, conn_id: &str) -> Option<ConnectionHandle> {
        self.conns.remove(conn_id).map(|(_, e)| e.handle)
    }

    /// Set or clear a connection's room scope. Idempotent.
    pub fn scope(&self, conn_id: &str, room_id: Option<&str>) {
        if let Some(mut entry) = self.conns.get_mut(conn_id) {
            entry.current_room = room_id.map(|r| r.to_string());
        }
    }

    pub fn current_room(&self, conn_id: &str) -> Option<String> {
        self.conns
            .get(conn_id)
            .and_then(|e| e.current_room.clone())
    }

    pub fn lookup(&self, conn_id: &str) -> Option<ConnectionHandle> {
        self.conns.get(conn_id).map(|e| e.handle.clone())
    }

    pub fn send_to(&self, conn_id: &str, event: ServerEvent) -> bool {
        match self.conns.get(conn_id) {
            Some(entry) => entry.handle.send(event),
            None => false,
        }
    }

    /// All connections currently scoped to a room.
    pub fn connections_in(&self, room_id: &str) -> Vec<ConnectionHandle> {
        self.conns
            .iter()
            .filter(|e| e.current_room.as_deref() == Some(room_id))
            .map(|e| e.handle.clone())
            .collect()
    }

    /// Fan an event out to every connection scoped to the room.
    pub fn broadcast_to_room(&self, room_id: &str, event: ServerEvent, exclude_conn_id: Option<&str>) {
        for handle in self.connections_in(room_id) {
            if Some(handle.conn_id.as_str()) == exclude_conn_id {
                continue;
            }
            handle.send(event.clone());
        }
    }

    pub fn connection_count(&self) -> usize {
        self.conns.len()
    }
}
