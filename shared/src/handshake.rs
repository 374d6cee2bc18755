//! Connection handshake and stream framing
//!
//! The lockstep channel runs over a reliable ordered byte stream. Each packet
//! is a 4-byte little-endian length followed by the payload. The first packet
//! a client sends is a bincode-encoded [`ConnectRequest`]; the server answers
//! with a bincode-encoded [`ConnectReply`]. After acceptance every packet
//! carries one tag-prefixed lockstep message.

use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single framed packet
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub key: String,
}

/// Why a connection was refused
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    RoomFull,
    InvalidKey,
    MatchInProgress,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RejectReason::RoomFull => "room full",
            RejectReason::InvalidKey => "invalid connection key",
            RejectReason::MatchInProgress => "match already in progress",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum ConnectReply {
    Accepted,
    Rejected { reason: RejectReason },
}

/// Writes one length-prefixed packet and flushes
pub async fn write_packet<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_PACKET_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("packet too large: {} bytes (max {MAX_PACKET_SIZE})", payload.len()),
        ));
    }
    let len = (payload.len() as u32).to_le_bytes();
    writer.write_all(&len).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Reads one length-prefixed packet
///
/// Returns `UnexpectedEof` when the stream closes, `InvalidData` when the
/// length exceeds [`MAX_PACKET_SIZE`].
pub async fn read_packet<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_PACKET_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("packet too large: {len} bytes (max {MAX_PACKET_SIZE})"),
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}
