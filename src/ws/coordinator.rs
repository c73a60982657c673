use std::sync::Arc;

use chrono::Utc;

use crate::directory::{RoomDirectory, RoomLocks};
use crate::error::{AppError, Result};
use crate::ws::registry::{ConnectionHandle, ConnectionRegistry};
use crate::ws::ServerEvent;

/// Session coordinator: reconciles the durable room record with the
/// volatile connection registry and drives all room-scoped fan-out.
///
/// The directory is authoritative for membership, the registry for live
/// connections. Every room mutation re-reads the durable record under that
/// room's lock; ordering is persist-then-scope on join and
/// unscope-then-persist on leave/disconnect.
pub struct Coordinator {
    directory: Arc<dyn RoomDirectory>,
    registry: Arc<ConnectionRegistry>,
    locks: Arc<RoomLocks>,
}

impl Coordinator {
    pub fn new(
        directory: Arc<dyn RoomDirectory>,
        registry: Arc<ConnectionRegistry>,
        locks: Arc<RoomLocks>,
    ) -> Self {
        Self {
            directory,
            registry,
            locks,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    fn connection(&self, conn_id: &str) -> Result<ConnectionHandle> {
        self.registry
            .lookup(conn_id)
            .ok_or_else(|| AppError::Internal(format!("Connection {} not registered", conn_id)))
    }

    /// Socket-layer join. Durable membership must already exist (the REST
    /// join precedes this; the socket layer never creates membership and
    /// never checks access codes).
    pub async fn join(&self, conn_id: &str, room_id: &str) -> Result<()> {
        let conn = self.connection(conn_id)?;
        let _guard = self.locks.hold(room_id).await;

        let room = self
            .directory
            .find(room_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))?;

        let participant = room
            .participant(&conn.identity)
            .ok_or_else(|| AppError::NotMember("You are not a participant in this room".into()))?;

        // Multi-device takeover: a newer connection claims the record; the
        // older one is silently unscoped so exactly one connection maps to
        // this participant.
        if let Some(prev) = participant.conn_id.as_deref() {
            if prev != conn_id && self.registry.current_room(prev).as_deref() == Some(room_id) {
                self.registry.scope(prev, None);
                tracing::info!(
                    room_id = %room_id,
                    identity = %conn.identity,
                    prev_conn = %prev,
                    "Participant record taken over by newer connection"
                );
            }
        }

        // Persist first, then scope: the record never points at a
        // connection the registry could have already dropped mid-join.
        let updated = self
            .directory
            .set_participant_conn(room_id, &conn.identity, Some(conn_id))
            .await?;
        self.registry.scope(conn_id, Some(room_id));

        self.registry.broadcast_to_room(
            room_id,
            ServerEvent::ParticipantArrived {
                identity: conn.identity.clone(),
                username: conn.username.clone(),
                conn_id: conn_id.to_string(),
            },
            Some(conn_id),
        );

        // Snapshot after the durable write: two near-simultaneous joiners
        // each see the other.
        let participants = updated.participants.clone();
        conn.send(ServerEvent::RoomJoined {
            room: updated.info(Some(&conn.identity)),
            participants,
        });

        tracing::info!(room_id = %room_id, identity = %conn.identity, conn_id = %conn_id, "Joined room");
        Ok(())
    }

    /// Socket-layer leave. Membership is retained; only the live connection
    /// is detached. No-op, not an error, when the connection is not scoped
    /// to the room.
    pub async fn leave(&self, conn_id: &str, room_id: &str) -> Result<()> {
        if self.registry.current_room(conn_id).as_deref() != Some(room_id) {
            return Ok(());
        }
        let conn = self.connection(conn_id)?;
        let _guard = self.locks.hold(room_id).await;

        // Unscope first, then persist.
        self.registry.scope(conn_id, None);
        self.detach_record(room_id, &conn.identity, conn_id).await?;

        self.registry.broadcast_to_room(
            room_id,
            ServerEvent::ParticipantDeparted {
                identity: conn.identity.clone(),
                username: conn.username.clone(),
            },
            None,
        );

        tracing::info!(room_id = %room_id, identity = %conn.identity, "Left room");
        Ok(())
    }

    /// Transport teardown. Equivalent to leave() for the scoped room, but
    /// never raises: the room may already be gone. Unregisters last.
    pub async fn disconnect(&self, conn_id: &str) {
        if let Some(room_id) = self.registry.current_room(conn_id) {
            let conn = match self.registry.lookup(conn_id) {
                Some(c) => c,
                None => return,
            };
            let _guard = self.locks.hold(&room_id).await;

            self.registry.scope(conn_id, None);
            if let Err(e) = self.detach_record(&room_id, &conn.identity, conn_id).await {
                tracing::warn!(
                    room_id = %room_id,
                    conn_id = %conn_id,
                    error = %e,
                    "Disconnect cleanup failed"
                );
            }

            self.registry.broadcast_to_room(
                &room_id,
                ServerEvent::ParticipantDepartedByDisconnect {
                    identity: conn.identity.clone(),
                    username: conn.username.clone(),
                },
                None,
            );

            tracing::info!(room_id = %room_id, identity = %conn.identity, "Disconnected from room");
        }

        self.registry.unregister(conn_id);
    }

    /// Clear the member's conn id, but only while the record still points
    /// at this connection — a takeover by a newer device must survive the
    /// old socket's teardown.
    async fn detach_record(&self, room_id: &str, identity: &str, conn_id: &str) -> Result<()> {
        match self.directory.find(room_id).await? {
            Some(room)
                if room
                    .participant(identity)
                    .and_then(|p| p.conn_id.as_deref())
                    == Some(conn_id) =>
            {
                self.directory
                    .set_participant_conn(room_id, identity, None)
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Chat fan-out to every connection scoped to the room, sender
    /// included, stamped with a coordinator-assigned timestamp.
    pub async fn chat(&self, conn_id: &str, room_id: &str, text: &str) -> Result<()> {
        if self.registry.current_room(conn_id).as_deref() != Some(room_id) {
            return Err(AppError::InvalidState("You are not in this room".into()));
        }
        let conn = self.connection(conn_id)?;

        self.registry.broadcast_to_room(
            room_id,
            ServerEvent::ChatMessage {
                identity: conn.identity.clone(),
                username: conn.username.clone(),
                text: text.trim().to_string(),
                server_timestamp: Utc::now(),
            },
            None,
        );

        tracing::debug!(room_id = %room_id, identity = %conn.identity, "Chat message relayed");
        Ok(())
    }

    /// Typing indicators: peers only, nothing persisted.
    pub async fn typing(&self, conn_id: &str, room_id: &str, started: bool) -> Result<()> {
        if self.registry.current_room(conn_id).as_deref() != Some(room_id) {
            return Err(AppError::InvalidState("You are not in this room".into()));
        }
        let conn = self.connection(conn_id)?;

        let event = if started {
            ServerEvent::UserTyping {
                identity: conn.identity.clone(),
                username: conn.username.clone(),
            }
        } else {
            ServerEvent::UserStoppedTyping {
                identity: conn.identity.clone(),
            }
        };
        self.registry.broadcast_to_room(room_id, event, Some(conn_id));
        Ok(())
    }

    /// Creator-only Live/Inactive toggle, persisted then fanned out to the
    /// whole room, sender included.
    pub async fn status_change(&self, conn_id: &str, room_id: &str, status: &str) -> Result<()> {
        let conn = self.connection(conn_id)?;
        let status = status.parse()?;

        let _guard = self.locks.hold(room_id).await;
        let room = self
            .directory
            .find(room_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))?;

        if !room.is_creator(&conn.identity) {
            return Err(AppError::Forbidden(
                "Only the room creator can update status".into(),
            ));
        }

        self.directory.set_status(room_id, status).await?;
        self.registry
            .broadcast_to_room(room_id, ServerEvent::RoomStatusUpdated { status }, None);

        tracing::info!(room_id = %room_id, status = ?status, "Room status updated");
        Ok(())
    }
}
