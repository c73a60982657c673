use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{AppError, Result};
use crate::models::{Participant, Room, RoomStatus};

use super::RoomDirectory;

/// In-memory room directory. Selected when no `REDIS_URL` is configured;
/// also backs the test suites. Each mutation runs under the map's exclusive
/// entry guard, so the read-check-write window is atomic per room.
#[derive(Default)]
pub struct MemoryDirectory {
    rooms: DashMap<String, Room>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }
}

#[async_trait]
impl RoomDirectory for MemoryDirectory {
    async fn create(&self, room: &Room) -> Result<()> {
        self.rooms.insert(room.room_id.clone(), room.clone());
        tracing::info!(room_id = %room.room_id, "Room created");
        Ok(())
    }

    async fn find(&self, room_id: &str) -> Result<Option<Room>> {
        Ok(self.rooms.get(room_id).map(|r| r.clone()))
    }

    async fn list(&self) -> Result<Vec<Room>> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|r| r.clone()).collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms)
    }

    async fn delete(&self, room_id: &str) -> Result<()> {
        self.rooms
            .remove(room_id)
            .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))?;
        tracing::info!(room_id = %room_id, "Room deleted");
        Ok(())
    }

    async fn insert_participant(&self, room_id: &str, participant: Participant) -> Result<Room> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))?;

        if room.participant(&participant.identity).is_none() {
            if room.is_full() {
                return Err(AppError::RoomFull);
            }
            room.participants.push(participant);
        }

        Ok(room.clone())
    }

    async fn remove_participant(&self, room_id: &str, identity: &str) -> Result<()> {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.participants.retain(|p| p.identity != identity);
        }
        Ok(())
    }

    async fn set_participant_conn(
        &self,
        room_id: &str,
        identity: &str,
        conn_id: Option<&str>,
    ) -> Result<Room> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| AppError::Conflict(format!("Room {} no longer exists", room_id)))?;

        let participant = room
            .participant_mut(identity)
            .ok_or_else(|| AppError::NotMember(format!("{} is not a member", identity)))?;
        participant.conn_id = conn_id.map(|c| c.to_string());

        Ok(room.clone())
    }

    async fn set_status(&self, room_id: &str, status: RoomStatus) -> Result<Room> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))?;
        room.status = status;
        Ok(room.clone())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
