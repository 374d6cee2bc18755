//! # Lockstep Client Library
//!
//! Headless client side of the lockstep protocol. It connects to the relay,
//! presents the shared key, waits for the start message and then exchanges
//! inputs, frames and checksums. Running an actual game simulation on top of
//! the frames is left to the embedding application.
//!
//! - `network`: connection, handshake and message exchange
//! - `hasher`: a small deterministic state fingerprint for bots and tests

pub mod hasher;
pub mod network;

pub use hasher::FrameHasher;
pub use network::{ClientError, LockstepClient};
