//! # Lockstep Relay Server Library
//!
//! This library provides the server side of a deterministic lockstep
//! multiplayer service. It never simulates the game. It decides who may join a
//! room, starts every participant's simulation with the same seed, and then
//! redistributes the inputs all participants submit so that each client's
//! simulation advances through exactly the same sequence of frames.
//!
//! ## Core Responsibilities
//!
//! ### Admission
//! A room has a fixed size and a shared secret. Connections are accepted only
//! while the room has a free slot, the key matches and the match has not yet
//! started. Rejections are ordinary outcomes, reported back to the client.
//!
//! ### Match Start
//! When the last slot fills, every peer receives a player id (in the order
//! peers arrived), the match seed and the tick rate. The broadcast loop starts
//! in the same step.
//!
//! ### Frame Broadcast
//! Inputs arriving during a tick are collected and packed into one frame per
//! tick, including empty frames. Every connected peer receives byte-identical
//! frames in the same order.
//!
//! ### Desync Detection
//! Clients report checksums of their state. The first report for a frame is
//! canonical; later reports are compared against it and mismatches logged.
//! Nothing is corrected.
//!
//! ## Architecture Design
//!
//! ### Two Execution Contexts
//! The room's event context drains a queue of transport events (connection
//! requests, received messages, disconnects) and owns all room state. A
//! separate tick-loop task packs and broadcasts frames at a fixed cadence using
//! a catch-up accumulator. They share an input channel, an atomic running flag
//! and counters; nothing else.
//!
//! ### Reliable Ordered Transport
//! Lockstep needs every frame, in order, at every client. The TCP transport
//! frames packets with a length prefix and gives each peer its own writer
//! task fed by an unbounded queue, so broadcasting never blocks the tick loop.
//!
//! ## Module Organization
//!
//! - `gateway`: pure admission decision
//! - `room`: lifecycle state machine, event handling and the tick loop
//! - `frame_packer`: input queue and per-tick frame serialization
//! - `checksum`: canonical checksum bookkeeping
//! - `transport`: transport trait and the TCP implementation
//! - `network`: listener ownership and back-to-back match hosting
//! - `config`: room and server settings
//! - `error`: server error type
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::{RoomConfig, ServerConfig};
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         room: RoomConfig {
//!             room_size: 4,
//!             ..RoomConfig::default()
//!         },
//!         ..ServerConfig::default()
//!     };
//!
//!     // Hosts one room after another on the same listener
//!     let mut server = Server::bind(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod config;
pub mod error;
pub mod frame_packer;
pub mod gateway;
pub mod network;
pub mod room;
pub mod transport;

pub use error::ServerError;
