//! Ship Sync Server Library
//!
//! Authoritative ship simulation with bit-packed, per-connection dirty-mask
//! replication and client-side prediction.
//!
//! - [`game`] holds the ship entity, its systems and the [`game::world::World`]
//!   that ticks them.
//! - [`net`] holds the bit stream, the ship update protocol, per-connection
//!   ghosting and the client replica.

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod metrics;
