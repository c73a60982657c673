use async_trait::async_trait;
use deadpool_redis::{Config as RedisConfig, Pool, Runtime};
use redis::AsyncCommands;

use crate::error::{AppError, Result};
use crate::models::{Participant, Room, RoomStatus};

use super::RoomDirectory;

const INDEX_KEY: &str = "rooms:index";

fn room_key(room_id: &str) -> String {
    format!("room:{}", room_id)
}

/// Create a Redis connection pool
pub fn create_pool(redis_url: &str) -> Result<Pool> {
    let redis_config = RedisConfig::from_url(redis_url);
    let pool = redis_config
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| AppError::Store(format!("Failed to create Redis pool: {}", e)))?;

    Ok(pool)
}

/// Redis-backed room directory. Each room is one JSON document under
/// `room:{id}`, with an id index set for listing. Mutations are
/// read-check-write against the live document; callers hold the room's
/// lock across the call.
#[derive(Clone)]
pub struct RedisDirectory {
    pool: Pool,
}

impl RedisDirectory {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn load(&self, room_id: &str) -> Result<Option<Room>> {
        let mut conn = self.pool.get().await?;
        let json: Option<String> = conn.get(room_key(room_id)).await?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, room: &Room) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let json = serde_json::to_string(room)?;
        conn.set::<_, _, ()>(room_key(&room.room_id), json).await?;
        Ok(())
    }
}

#[async_trait]
impl RoomDirectory for RedisDirectory {
    async fn create(&self, room: &Room) -> Result<()> {
        self.store(room).await?;

        let mut conn = self.pool.get().await?;
        conn.sadd::<_, _, ()>(INDEX_KEY, &room.room_id).await?;

        tracing::info!(room_id = %room.room_id, "Room created");
        Ok(())
    }

    async fn find(&self, room_id: &str) -> Result<Option<Room>> {
        self.load(room_id).await
    }

    async fn list(&self) -> Result<Vec<Room>> {
        let mut conn = self.pool.get().await?;
        let ids: Vec<String> = conn.smembers(INDEX_KEY).await?;

        let mut rooms = Vec::with_capacity(ids.len());
        for id in ids {
            match self.load(&id).await? {
                Some(room) => rooms.push(room),
                // Stale index entry; self-heal.
                None => {
                    let mut conn = self.pool.get().await?;
                    conn.srem::<_, _, ()>(INDEX_KEY, &id).await?;
                }
            }
        }

        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms)
    }

    async fn delete(&self, room_id: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let removed: u32 = conn.del(room_key(room_id)).await?;
        conn.srem::<_, _, ()>(INDEX_KEY, room_id).await?;

        if removed == 0 {
            return Err(AppError::NotFound(format!("Room {} not found", room_id)));
        }

        tracing::info!(room_id = %room_id, "Room deleted");
        Ok(())
    }

    async fn insert_participant(&self, room_id: &str, participant: Participant) -> Result<Room> {
        let mut room = self
            .load(room_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))?;

        if room.participant(&participant.identity).is_none() {
            if room.is_full() {
                return Err(AppError::RoomFull);
            }
            room.participants.push(participant);
            self.store(&room).await?;
        }

        Ok(room)
    }

    async fn remove_participant(&self, room_id: &str, identity: &str) -> Result<()> {
        if let Some(mut room) = self.load(room_id).await? {
            let before = room.participants.len();
            room.participants.retain(|p| p.identity != identity);
            if room.participants.len() != before {
                self.store(&room).await?;
            }
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
            .load(room_id)
            .await?
            .ok_or_else(|| AppError::Conflict(format!("Room {} no longer exists", room_id)))?;

        let participant = room
            .participant_mut(identity)
            .ok_or_else(|| AppError::NotMember(format!("{} is not a member", identity)))?;
        participant.conn_id = conn_id.map(|c| c.to_string());

        self.store(&room).await?;
        Ok(room)
    }

    async fn set_status(&self, room_id: &str, status: RoomStatus) -> Result<Room> {
        let mut room = self
            .load(room_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))?;

        room.status = status;
        self.store(&room).await?;
        Ok(room)
    }

    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| AppError::Store(e.to_string()))?;

        Ok(pong == "PONG")
    }
}
