use serde::{Deserialize, Serialize};

use crate::game::moves::MoveRecord;
use crate::net::ghost::ConnectionId;

/// Messages from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Request a ship
    Hello {
        name: String,
        /// Loadout in its delimited text form; server default when absent
        loadout: Option<String>,
    },
    /// One prepared move for the controlled ship
    Move { seq: u32, mv: MoveRecord },
    /// Ask for a different loadout at the next respawn
    ChangeLoadout { loadout: String },
    /// Ping for latency measurement
    Ping { timestamp: u64 },
    /// Leaving
    Leave,
}

/// Messages from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Connection accepted
    Welcome {
        connection: ConnectionId,
        tick_rate: u32,
    },
    /// Bit-packed ghost packet for one tick
    Ghosts { tick: u64, payload: Vec<u8> },
    /// Pong response with server timestamp
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
    /// Loadout text was rejected
    LoadoutRejected { reason: String },
    /// Server is dropping the connection
    Kicked { reason: String },
}

/// Encode a message using bincode.
/// Uses legacy config for fixed-size integers.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
