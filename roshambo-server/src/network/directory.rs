//! Identity and Room Directory
//!
//! Collaborators consumed by the coordinator. The coordinator only needs
//! read access (`IdentityProvider::lookup`, `RoomDirectory::roster`); the
//! in-memory implementations also carry the login and room allocation
//! operations served by the HTTP layer.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::game::round::{ParticipantId, RoomId};

/// Players allowed in one room.
pub const ROOM_CAPACITY: usize = 2;

/// Length of generated room codes.
pub const ROOM_CODE_LEN: usize = 5;

const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Directory errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// Unknown room code.
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// Room already has two members.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// Unknown participant id.
    #[error("user {0} not found")]
    UserNotFound(ParticipantId),

    /// Participant is not on the room's roster.
    #[error("participant {participant} is not a member of room {room}")]
    ParticipantNotAuthorized {
        /// Room code.
        room: RoomId,
        /// Rejected participant.
        participant: ParticipantId,
    },

    /// Empty or whitespace-only username.
    #[error("username must not be empty")]
    InvalidUsername,
}

/// Room membership as known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRoster {
    /// Room code.
    pub room_id: RoomId,
    /// Human-readable room name.
    pub room_name: String,
    /// Members in join order.
    pub players: Vec<ParticipantId>,
}

impl RoomRoster {
    /// Check if a participant is on the roster.
    pub fn admits(&self, participant: &ParticipantId) -> bool {
        self.players.contains(participant)
    }
}

/// Maps participant ids to display names.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Display name for a participant.
    async fn lookup(&self, participant: &ParticipantId) -> Result<String, DirectoryError>;
}

/// Authoritative room membership.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Current roster of a room.
    async fn roster(&self, room_id: &str) -> Result<RoomRoster, DirectoryError>;
}

// =============================================================================
// IN-MEMORY IDENTITY
// =============================================================================

/// Username registry. Logging in with a known username returns its id.
#[derive(Debug, Default)]
pub struct InMemoryIdentityProvider {
    users: RwLock<BTreeMap<ParticipantId, String>>,
}

impl InMemoryIdentityProvider {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log in by username, minting a new id for unseen names.
    pub async fn login(&self, username: &str) -> Result<ParticipantId, DirectoryError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(DirectoryError::InvalidUsername);
        }

        let mut users = self.users.write().await;
        if let Some((id, _)) = users.iter().find(|(_, name)| name.as_str() == username) {
            return Ok(id.clone());
        }

        let id = ParticipantId::new(uuid::Uuid::new_v4().to_string());
        users.insert(id.clone(), username.to_string());
        Ok(id)
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn lookup(&self, participant: &ParticipantId) -> Result<String, DirectoryError> {
        self.users
            .read()
            .await
            .get(participant)
            .cloned()
            .ok_or_else(|| DirectoryError::UserNotFound(participant.clone()))
    }
}

// =============================================================================
// IN-MEMORY ROOMS
// =============================================================================

/// Room allocation and membership.
#[derive(Debug, Default)]
pub struct InMemoryRoomDirectory {
    rooms: RwLock<BTreeMap<RoomId, RoomRoster>>,
}

impl InMemoryRoomDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a room with the creator as its first member.
    pub async fn create_room(&self, creator: ParticipantId, room_name: Option<&str>) -> RoomRoster {
        let room_name = room_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("Room")
            .to_string();

        let mut rooms = self.rooms.write().await;
        let room_id = loop {
            let code = generate_room_code();
            if !rooms.contains_key(&code) {
                break code;
            }
        };

        let roster = RoomRoster {
            room_id: room_id.clone(),
            room_name,
            players: vec![creator],
        };
        rooms.insert(room_id, roster.clone());
        roster
    }

    /// Join an existing room. Rejoining as a current member is a no-op.
    pub async fn join_room(
        &self,
        room_id: &str,
        participant: ParticipantId,
    ) -> Result<RoomRoster, DirectoryError> {
        let mut rooms = self.rooms.write().await;
        let roster = rooms
            .get_mut(room_id)
            .ok_or_else(|| DirectoryError::RoomNotFound(room_id.to_string()))?;

        if !roster.admits(&participant) {
            if roster.players.len() >= ROOM_CAPACITY {
                return Err(DirectoryError::RoomFull(room_id.to_string()));
            }
            roster.players.push(participant);
        }

        Ok(roster.clone())
    }
}

#[async_trait]
impl RoomDirectory for InMemoryRoomDirectory {
    async fn roster(&self, room_id: &str) -> Result<RoomRoster, DirectoryError> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| DirectoryError::RoomNotFound(room_id.to_string()))
    }
}

/// Random room code from `A-Z0-9`.
fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_CHARSET[rng.gen_range(0..ROOM_CODE_CHARSET.len())] as char)
        .collect()
}
