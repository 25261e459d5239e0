//! Two-seat relay server.
//!
//! Accepts WebSocket-style connections, pairs guests two-at-a-time into
//! rooms, and forwards every frame one party sends verbatim to the
//! other. Command messages (`NAME`, `ROOM`, `PING`) are consumed by the
//! server; all other traffic streams through frame-by-frame, with a
//! per-destination queue keeping two producers from interleaving on one
//! wire.

pub mod delivery;
pub mod guest;
pub mod hall;
pub mod handshake;
pub mod room;
pub mod server;
pub mod session;

pub use guest::Guest;
pub use hall::Hall;
pub use handshake::HandshakeError;
pub use room::Room;
pub use server::{RelayServer, ServerConfig};

/// Errors produced by the relay server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
