//! Protocol Messages
//!
//! JSON wire format for the real-time WebSocket path.
//! Every message is an object tagged by `"type"`.

use serde::{Deserialize, Serialize};

use crate::game::round::{RoomStatus, RoundReport};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Submit a move for the current round. Validated server-side.
    SubmitMove {
        /// Raw move, case-insensitive.
        #[serde(rename = "move")]
        mv: String,
    },

    /// Acknowledge the result and ask for the next round.
    #[serde(alias = "ready_for_next_round")]
    AcknowledgeNextRound,

    /// Request the current room status.
    QueryStatus,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after admission.
    Connected { room_status: RoomStatus },

    /// A move was recorded in the room.
    MoveReceived { moves_count: usize },

    /// Round resolved: `{ moves, winner }`.
    Result(RoundReport),

    /// Both players acknowledged; a new round begins.
    Reset,

    /// The other participant's connection went away.
    PeerDisconnected { name: String },

    /// Reply to `query_status`.
    Status { room_status: RoomStatus },

    /// Request rejected. Only sent to the offending connection.
    Error(ServerError),

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Server is shutting down, or this connection was superseded.
    Shutdown { reason: String },
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build an error message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be parsed.
    InvalidMessage,
    /// Move is not rock, paper or scissors.
    InvalidMove,
    /// Round resolved and awaiting acknowledgment.
    SessionBusy,
    /// Room unknown to the directory.
    RoomNotFound,
    /// Participant not on the room roster.
    NotAuthorized,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Shorthand for an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError::new(code, message))
    }
}
