//! Room Session Management
//!
//! Owns every room's round state. Each room sits behind its own
//! `Arc<RwLock<RoomSession>>`: mutations on one room are serialized, other
//! rooms are never blocked. The outer map lock is only held long enough to
//! look up or insert a room.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::game::round::{ParticipantId, RoomId, RoomSession, RoomStatus};

/// Manages all room sessions.
pub struct SessionManager {
    rooms: RwLock<BTreeMap<RoomId, Arc<RwLock<RoomSession>>>>,
}

impl SessionManager {
    /// Create new session manager.
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
        }
    }

    /// Get a room's session, if it has one.
    pub async fn get_session(&self, room_id: &str) -> Option<Arc<RwLock<RoomSession>>> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).cloned()
    }

    /// Get or lazily create a room's session.
    pub async fn get_or_create(&self, room_id: &str) -> Arc<RwLock<RoomSession>> {
        if let Some(session) = self.get_session(room_id).await {
            return session;
        }

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(RoomSession::new(room_id))))
            .clone()
    }

    /// Snapshot of a room. Rooms without a session report an empty round.
    pub async fn status(&self, room_id: &str) -> RoomStatus {
        match self.get_session(room_id).await {
            Some(session) => session.read().await.status(),
            None => RoomSession::new(room_id).status(),
        }
    }

    /// Display name cached in the room's current round.
    pub async fn cached_name(&self, room_id: &str, participant: &ParticipantId) -> Option<String> {
        let session = self.get_session(room_id).await?;
        let session = session.read().await;
        session.cached_name(participant).map(str::to_string)
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
