//! Network Layer
//!
//! Everything that touches connections or shared state: the per-room
//! session store, live connection bookkeeping, fan-out, and the two
//! transports. Round rules themselves live in `game/`.

pub mod coordinator;
pub mod directory;
pub mod dispatch;
pub mod http;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use coordinator::{CoordinatorError, PollOutcome, RoomCoordinator};
pub use directory::{
    DirectoryError, IdentityProvider, InMemoryIdentityProvider, InMemoryRoomDirectory,
    RoomDirectory, RoomRoster,
};
pub use dispatch::{BroadcastDispatcher, BroadcastReport, DeliveryFailure};
pub use protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
pub use server::{ConfigError, GameServer, GameServerError, ServerConfig};
pub use session::SessionManager;
