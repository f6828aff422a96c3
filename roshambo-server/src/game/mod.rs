//! Game Logic Module
//!
//! Transport-free round rules. Nothing here awaits or locks.
//!
//! ## Module Structure
//!
//! - `moves`: Move values and parsing
//! - `outcome`: Pairwise outcome resolution
//! - `round`: Per-room round state machine

pub mod moves;
pub mod outcome;
pub mod round;

// Re-export key types
pub use moves::{InvalidMove, Move};
pub use outcome::{resolve_outcome, Outcome};
pub use round::{
    AckOutcome, ParticipantId, RoomId, RoomSession, RoomStatus, RoundPhase, RoundReport,
    RoundResult, SessionError, SubmitReceipt,
};
