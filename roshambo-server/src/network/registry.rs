//! Connection Registry
//!
//! Live outbound channels keyed by (room, participant). Delivery
//! bookkeeping only; game state lives in `network::session`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Notify, RwLock};

use crate::game::round::{ParticipantId, RoomId};
use crate::network::dispatch::DeliveryFailure;
use crate::network::protocol::ServerMessage;

/// Identifies one accepted transport connection.
pub type ConnectionId = u64;

/// Outbound side of a live connection. Messages are delivered FIFO.
///
/// Clones share one close signal: the task owning the transport waits on
/// `closed()` and tears the socket down once any clone calls `close()`.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Connection identifier, unique for the process lifetime.
    pub id: ConnectionId,
    sender: mpsc::Sender<ServerMessage>,
    close: Arc<Notify>,
}

impl ConnectionHandle {
    /// Wrap an outbound channel.
    pub fn new(id: ConnectionId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            sender,
            close: Arc::new(Notify::new()),
        }
    }

    /// Ask the owning task to close the transport. Already-queued messages
    /// are still flushed.
    pub fn close(&self) {
        // notify_one keeps a permit, so a later `closed()` still fires.
        self.close.notify_one();
    }

    /// Resolves once `close()` has been called on any clone.
    pub async fn closed(&self) {
        self.close.notified().await;
    }

    /// Queue a message without waiting.
    pub fn try_deliver(&self, message: ServerMessage) -> Result<(), DeliveryFailure> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryFailure::Backlogged,
            TrySendError::Closed(_) => DeliveryFailure::Closed,
        })
    }
}

/// Live connections, grouped by room.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    rooms: RwLock<BTreeMap<RoomId, BTreeMap<ParticipantId, ConnectionHandle>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, replacing any earlier one for the same
    /// participant. Returns the new handle and the one it replaced.
    pub async fn register(
        &self,
        room_id: &str,
        participant: &ParticipantId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> (ConnectionHandle, Option<ConnectionHandle>) {
        let handle = ConnectionHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed), sender);

        let mut rooms = self.rooms.write().await;
        let replaced = rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(participant.clone(), handle.clone());

        (handle, replaced)
    }

    /// Remove a participant's connection only if it is still `connection`.
    /// A reconnect that already replaced it is left alone.
    pub async fn unregister_connection(
        &self,
        room_id: &str,
        participant: &ParticipantId,
        connection: ConnectionId,
    ) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(connections) = rooms.get_mut(room_id) else {
            return false;
        };

        if connections.get(participant).map(|h| h.id) != Some(connection) {
            return false;
        }

        connections.remove(participant);
        if connections.is_empty() {
            rooms.remove(room_id);
        }
        true
    }

    /// Handle for a participant, if connected.
    pub async fn get(
        &self,
        room_id: &str,
        participant: &ParticipantId,
    ) -> Option<ConnectionHandle> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id)?.get(participant).cloned()
    }

    /// All connections in a room.
    pub async fn connections(&self, room_id: &str) -> Vec<(ParticipantId, ConnectionHandle)> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .map(|connections| {
                connections
                    .iter()
                    .map(|(p, h)| (p.clone(), h.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rooms with at least one connection.
    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().cloned().collect()
    }

    /// Total live connections.
    pub async fn connection_count(&self) -> usize {
        self.rooms.read().await.values().map(BTreeMap::len).sum()
    }
}
