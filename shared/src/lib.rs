//! # Lockstep Protocol
//!
//! Wire types shared by the lockstep relay server and its clients.
//!
//! The server never simulates anything. It orders the inputs every client
//! submits during a tick, packs them into one frame and sends that frame to
//! everybody. Given the same seed and the same ordered frames, each client's
//! deterministic simulation advances identically. Clients periodically report
//! a checksum of their state so the server can spot divergence.
//!
//! ## Modules
//!
//! - `codec`: little-endian field writer/reader over a reusable scratch buffer
//! - `message`: tag-prefixed message kinds and their field layouts
//! - `handshake`: connection key exchange and length-prefixed stream framing
//! - `error`: protocol decode failures

pub mod codec;
pub mod error;
pub mod handshake;
pub mod message;

pub use codec::{NetReader, NetWriter};
pub use error::ProtocolError;
pub use handshake::{ConnectReply, ConnectRequest, RejectReason};
pub use message::{Checksum, Message, MessageTag, StartSimulation};

/// Port the relay listens on unless configured otherwise
pub const DEFAULT_PORT: u16 = 9050;
/// Simulation rate the server announces unless configured otherwise
pub const DEFAULT_TARGET_FPS: u32 = 20;
/// Shared secret clients must present to join
pub const DEFAULT_CONNECTION_KEY: &str = "SomeConnectionKey";
/// Players required before a match starts
pub const DEFAULT_ROOM_SIZE: usize = 2;

/// Identifier of a player inside one match, assigned from 0 in join order
pub type PlayerId = u8;
