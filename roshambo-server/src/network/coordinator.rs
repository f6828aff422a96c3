//! Room Coordinator
//!
//! The single entry point both transports use. Checks admission against the
//! room directory, resolves display names, serializes round mutations
//! through the room's lock, and fans results out through the dispatcher.
//!
//! Fan-out for a mutation is queued while the room lock is still held so
//! every connection observes events in the order the round changed.
//! Queueing never waits (see `ConnectionHandle::try_deliver`), so the lock
//! hold time stays bounded.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::game::round::{
    AckOutcome, ParticipantId, RoomStatus, RoundReport, SessionError, SubmitReceipt,
};
use crate::network::directory::{DirectoryError, IdentityProvider, RoomDirectory, RoomRoster};
use crate::network::dispatch::BroadcastDispatcher;
use crate::network::protocol::{ErrorCode, ServerMessage};
use crate::network::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use crate::network::session::SessionManager;

/// Coordinator errors, returned only to the caller that caused them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// Round rule violation.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Room or roster check failed.
    #[error(transparent)]
    Admission(#[from] DirectoryError),
}

impl CoordinatorError {
    /// Wire error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoordinatorError::Session(SessionError::InvalidMove(_)) => ErrorCode::InvalidMove,
            CoordinatorError::Session(SessionError::SessionBusy { .. }) => ErrorCode::SessionBusy,
            CoordinatorError::Admission(DirectoryError::RoomNotFound(_)) => ErrorCode::RoomNotFound,
            CoordinatorError::Admission(DirectoryError::ParticipantNotAuthorized { .. }) => {
                ErrorCode::NotAuthorized
            }
            CoordinatorError::Admission(_) => ErrorCode::InternalError,
        }
    }

    /// Protocol message carrying this error.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.code(), self.to_string())
    }
}

/// What a request/response status poll observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Fewer than two moves recorded.
    Waiting,
    /// Round resolved; the caller's acknowledgment has been recorded.
    Resolved(RoundReport),
}

/// Coordinates rounds, connections and delivery for every room.
pub struct RoomCoordinator {
    sessions: Arc<SessionManager>,
    registry: Arc<ConnectionRegistry>,
    dispatcher: BroadcastDispatcher,
    identity: Arc<dyn IdentityProvider>,
    directory: Arc<dyn RoomDirectory>,
}

impl RoomCoordinator {
    /// Create a coordinator over the given collaborators.
    pub fn new(identity: Arc<dyn IdentityProvider>, directory: Arc<dyn RoomDirectory>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            sessions: Arc::new(SessionManager::new()),
            dispatcher: BroadcastDispatcher::new(registry.clone()),
            registry,
            identity,
            directory,
        }
    }

    /// Session store.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Check a participant against the room's roster.
    pub async fn admit(
        &self,
        room_id: &str,
        participant: &ParticipantId,
    ) -> Result<RoomRoster, DirectoryError> {
        let roster = self.directory.roster(room_id).await?;
        if !roster.admits(participant) {
            return Err(DirectoryError::ParticipantNotAuthorized {
                room: room_id.to_string(),
                participant: participant.clone(),
            });
        }
        Ok(roster)
    }

    /// Display name for a participant: the round's cached name, else an
    /// identity lookup, else a placeholder derived from the id.
    pub async fn display_name(&self, room_id: &str, participant: &ParticipantId) -> String {
        if let Some(name) = self.sessions.cached_name(room_id, participant).await {
            return name;
        }

        match self.identity.lookup(participant).await {
            Ok(name) => name,
            Err(e) => {
                debug!(participant = participant.short(), "identity lookup failed: {e}");
                placeholder_name(participant)
            }
        }
    }

    /// Register an admitted connection and greet it with the room status.
    ///
    /// Registration and the greeting happen under the room's read lock, so
    /// `connected` is always the first message the connection sees and no
    /// move can land between the snapshot and the registration.
    pub async fn connect(
        &self,
        room_id: &str,
        participant: &ParticipantId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> ConnectionHandle {
        let session = self.sessions.get_or_create(room_id).await;
        let session = session.read().await;

        let (handle, replaced) = self.registry.register(room_id, participant, sender).await;

        if let Some(old) = replaced {
            info!(
                room = room_id,
                participant = participant.short(),
                old = old.id,
                new = handle.id,
                "connection replaced"
            );
            let _ = old.try_deliver(ServerMessage::Shutdown {
                reason: "replaced by a newer connection".to_string(),
            });
            old.close();
        }

        let room_status = session.status();
        let _ = self
            .dispatcher
            .deliver(room_id, participant, &handle, ServerMessage::Connected { room_status })
            .await;
        drop(session);

        handle
    }

    /// Drop a connection and tell the remaining peer. Round state is not
    /// touched: leaving is not forfeiting.
    pub async fn disconnect(
        &self,
        room_id: &str,
        participant: &ParticipantId,
        connection: ConnectionId,
    ) {
        if !self
            .registry
            .unregister_connection(room_id, participant, connection)
            .await
        {
            return;
        }

        info!(room = room_id, participant = participant.short(), "participant disconnected");
        self.announce_departures(room_id, vec![participant.clone()]).await;
    }

    /// Record a move and publish `move_received`, plus `result` when this
    /// move completes the round.
    pub async fn submit_move(
        &self,
        room_id: &str,
        participant: &ParticipantId,
        raw_move: &str,
    ) -> Result<SubmitReceipt, CoordinatorError> {
        self.admit(room_id, participant).await?;
        let name = self.display_name(room_id, participant).await;

        let session = self.sessions.get_or_create(room_id).await;
        let mut session = session.write().await;

        let receipt = match session.submit_move(participant, &name, raw_move) {
            Ok(receipt) => receipt,
            Err(e) => {
                debug!(room = room_id, participant = participant.short(), "move rejected: {e}");
                return Err(e.into());
            }
        };

        info!(
            room = room_id,
            participant = participant.short(),
            moves_count = receipt.moves_count,
            replaced = receipt.replaced,
            "move accepted"
        );

        let mut failed = self
            .dispatcher
            .broadcast(
                room_id,
                ServerMessage::MoveReceived {
                    moves_count: receipt.moves_count,
                },
                None,
            )
            .await
            .failed;

        if let Some(result) = &receipt.result {
            let report = result.report();
            info!(
                room = room_id,
                round = result.round,
                winner = %report.winner,
                "round resolved"
            );
            failed.extend(
                self.dispatcher
                    .broadcast(room_id, ServerMessage::Result(report), None)
                    .await
                    .failed,
            );
        }
        drop(session);

        self.announce_departures(room_id, failed).await;
        Ok(receipt)
    }

    /// Acknowledge the result; publishes `reset` when both have.
    pub async fn acknowledge(&self, room_id: &str, participant: &ParticipantId) -> AckOutcome {
        let Some(session) = self.sessions.get_session(room_id).await else {
            return AckOutcome::Ignored;
        };
        let mut session = session.write().await;
        let outcome = session.acknowledge(participant);

        let failed = self.publish_ack(room_id, participant, &outcome).await;
        drop(session);

        self.announce_departures(room_id, failed).await;
        outcome
    }

    /// Request/response status poll. Returns `Waiting` until the round
    /// resolves, then the result, recording the caller's acknowledgment in
    /// the same critical section.
    pub async fn poll_state(
        &self,
        room_id: &str,
        participant: &ParticipantId,
    ) -> Result<PollOutcome, CoordinatorError> {
        self.admit(room_id, participant).await?;

        let Some(session) = self.sessions.get_session(room_id).await else {
            return Ok(PollOutcome::Waiting);
        };
        let mut session = session.write().await;

        let Some(result) = session.resolve() else {
            return Ok(PollOutcome::Waiting);
        };
        let outcome = session.acknowledge(participant);

        let failed = self.publish_ack(room_id, participant, &outcome).await;
        drop(session);

        self.announce_departures(room_id, failed).await;
        Ok(PollOutcome::Resolved(result.report()))
    }

    /// Read-only snapshot.
    pub async fn status(&self, room_id: &str) -> RoomStatus {
        self.sessions.status(room_id).await
    }

    /// Tell every live connection the server is going away.
    pub async fn shutdown(&self, reason: &str) {
        for room_id in self.registry.room_ids().await {
            self.dispatcher
                .broadcast(
                    &room_id,
                    ServerMessage::Shutdown {
                        reason: reason.to_string(),
                    },
                    None,
                )
                .await;
        }
    }

    async fn publish_ack(
        &self,
        room_id: &str,
        participant: &ParticipantId,
        outcome: &AckOutcome,
    ) -> Vec<ParticipantId> {
        match outcome {
            AckOutcome::Reset { completed_round } => {
                info!(room = room_id, round = completed_round, "round reset");
                self.dispatcher
                    .broadcast(room_id, ServerMessage::Reset, None)
                    .await
                    .failed
            }
            AckOutcome::Recorded { waiting_on } => {
                debug!(
                    room = room_id,
                    participant = participant.short(),
                    waiting_on = waiting_on.short(),
                    "acknowledged"
                );
                Vec::new()
            }
            AckOutcome::Ignored => Vec::new(),
        }
    }

    /// Notify the rest of the room about participants whose connections
    /// went away. Failures here are not chased further.
    async fn announce_departures(&self, room_id: &str, departed: Vec<ParticipantId>) {
        for participant in departed {
            if self.registry.get(room_id, &participant).await.is_some() {
                // Reconnected in the meantime.
                continue;
            }
            let name = self.display_name(room_id, &participant).await;
            let report = self
                .dispatcher
                .broadcast(room_id, ServerMessage::PeerDisconnected { name }, Some(&participant))
                .await;
            if !report.failed.is_empty() {
                warn!(room = room_id, failed = report.failed.len(), "peer notice undeliverable");
            }
        }
    }
}

/// Name used when the identity provider has none.
pub fn placeholder_name(participant: &ParticipantId) -> String {
    format!("Player-{}", participant.short())
}
