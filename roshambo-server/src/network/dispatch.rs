//! Broadcast Dispatcher
//!
//! Best-effort delivery to one or all connections of a room. A failed write
//! counts as an implicit disconnect: the handle is unregistered, its
//! transport is told to close, and the failure is reported as a value,
//! never raised.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::game::round::ParticipantId;
use crate::network::protocol::ServerMessage;
use crate::network::registry::{ConnectionHandle, ConnectionRegistry};

/// Why a message did not reach a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryFailure {
    /// No connection registered for the participant.
    #[error("participant has no live connection")]
    NotConnected,

    /// The connection's writer has gone away.
    #[error("connection closed")]
    Closed,

    /// The connection's outbound buffer is full.
    #[error("outbound buffer full")]
    Backlogged,
}

/// Per-recipient outcome of a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients the message was queued for.
    pub delivered: Vec<ParticipantId>,
    /// Recipients that failed and were unregistered.
    pub failed: Vec<ParticipantId>,
}

/// Delivers protocol messages through the connection registry.
#[derive(Debug, Clone)]
pub struct BroadcastDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastDispatcher {
    /// Create a dispatcher over a registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Send to one participant.
    pub async fn send_to(
        &self,
        room_id: &str,
        participant: &ParticipantId,
        message: ServerMessage,
    ) -> Result<(), DeliveryFailure> {
        let Some(handle) = self.registry.get(room_id, participant).await else {
            return Err(DeliveryFailure::NotConnected);
        };
        self.deliver(room_id, participant, &handle, message).await
    }

    /// Send to every connection in the room except `exclude`.
    pub async fn broadcast(
        &self,
        room_id: &str,
        message: ServerMessage,
        exclude: Option<&ParticipantId>,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for (participant, handle) in self.registry.connections(room_id).await {
            if exclude == Some(&participant) {
                continue;
            }
            match self.deliver(room_id, &participant, &handle, message.clone()).await {
                Ok(()) => report.delivered.push(participant),
                Err(_) => report.failed.push(participant),
            }
        }

        report
    }

    /// Send to one specific connection, whether or not it is still the
    /// participant's registered one.
    pub async fn deliver(
        &self,
        room_id: &str,
        participant: &ParticipantId,
        handle: &ConnectionHandle,
        message: ServerMessage,
    ) -> Result<(), DeliveryFailure> {
        match handle.try_deliver(message) {
            Ok(()) => Ok(()),
            Err(failure) => {
                warn!(
                    room = room_id,
                    participant = participant.short(),
                    connection = handle.id,
                    "delivery failed ({failure}), dropping connection"
                );
                handle.close();
                if !self
                    .registry
                    .unregister_connection(room_id, participant, handle.id)
                    .await
                {
                    debug!(room = room_id, "connection already replaced or removed");
                }
                Err(failure)
            }
        }
    }
}
