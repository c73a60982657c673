use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const MIN_CAPACITY: u32 = 2;
pub const MAX_CAPACITY: u32 = 50;

/// Room visibility. Private rooms carry an access code, public rooms never do.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// Room status, toggled by the creator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoomStatus {
    Inactive,
    Live,
}

impl FromStr for RoomStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Inactive" => Ok(RoomStatus::Inactive),
            "Live" => Ok(RoomStatus::Live),
            other => Err(AppError::InvalidValue(format!(
                "Invalid room status: {}",
                other
            ))),
        }
    }
}

/// Durable room membership of an identity, independent of live connection
/// state. `conn_id` is None while the member is offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub identity: String,
    pub username: String,
    pub joined_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conn_id: Option<String>,
}

impl Participant {
    pub fn new(identity: &str, username: &str) -> Self {
        Self {
            identity: identity.to_string(),
            username: username.to_string(),
            joined_at: Utc::now(),
            conn_id: None,
        }
    }
}

/// Durable room record as held by the room directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_id: String,
    pub name: String,
    pub creator: String,
    pub creator_name: String,
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_code: Option<String>,
    pub capacity: u32,
    pub status: RoomStatus,
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(
        name: String,
        creator: &str,
        creator_name: &str,
        visibility: Visibility,
        access_code: Option<String>,
        capacity: u32,
    ) -> Self {
        Self {
            room_id: uuid::Uuid::new_v4().to_string(),
            name,
            creator: creator.to_string(),
            creator_name: creator_name.to_string(),
            visibility,
            access_code,
            capacity: capacity.clamp(MIN_CAPACITY, MAX_CAPACITY),
            status: RoomStatus::Live,
            participants: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_creator(&self, identity: &str) -> bool {
        self.creator == identity
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.capacity as usize
    }

    pub fn participant(&self, identity: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.identity == identity)
    }

    pub fn participant_mut(&mut self, identity: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.identity == identity)
    }

    /// Client-facing view. The access code is only disclosed to the creator.
    pub fn info(&self, viewer: Option<&str>) -> RoomInfo {
        let access_code = match viewer {
            Some(id) if self.is_creator(id) => self.access_code.clone(),
            _ => None,
        };

        RoomInfo {
            room_id: self.room_id.clone(),
            name: self.name.clone(),
            creator: self.creator.clone(),
            creator_name: self.creator_name.clone(),
            visibility: self.visibility,
            access_code,
            capacity: self.capacity,
            status: self.status,
            participant_count: self.participants.len(),
            participants: self.participants.clone(),
            created_at: self.created_at,
        }
    }
}

/// Room as returned to clients: the stored record minus undisclosed secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room_id: String,
    pub name: String,
    pub creator: String,
    pub creator_name: String,
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_code: Option<String>,
    pub capacity: u32,
    pub status: RoomStatus,
    pub participant_count: usize,
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
}

/// Request to create a room
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

fn default_capacity() -> u32 {
    10
}

/// Request to join a room (durable membership, REST layer)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    #[serde(default)]
    pub access_code: Option<String>,
}

/// Request to update room status
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: String,
}
