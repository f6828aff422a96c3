//! # Roshambo Server
//!
//! Session coordination for two-player rock-paper-scissors rooms.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ROSHAMBO SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/             - Round rules (pure, synchronous)         │
//! │  ├── moves.rs      - Move parsing and dominance              │
//! │  ├── outcome.rs    - Pairwise outcome resolution             │
//! │  └── round.rs      - Submit / resolve / acknowledge          │
//! │                                                              │
//! │  network/          - Shared state and transports             │
//! │  ├── session.rs    - Per-room locked round state             │
//! │  ├── registry.rs   - Live connections per room               │
//! │  ├── dispatch.rs   - Best-effort fan-out                     │
//! │  ├── directory.rs  - Identity and room membership            │
//! │  ├── coordinator.rs- Single entry point for both transports  │
//! │  ├── protocol.rs   - WebSocket message types                 │
//! │  ├── server.rs     - WebSocket server                        │
//! │  └── http.rs       - Request/response fallback               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! Every mutation of a room happens under that room's lock, and the
//! resulting events are queued to each connection before the lock is
//! released. Two participants therefore always observe the same sequence
//! of `move_received`, `result` and `reset` events.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::{Move, Outcome, ParticipantId, RoomSession, RoundReport};
pub use network::{GameServer, RoomCoordinator, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
