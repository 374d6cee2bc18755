use thiserror::Error;

use crate::transport::PeerId;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("handshake encoding failed: {0}")]
    Handshake(#[from] bincode::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("peer {0} is not connected")]
    PeerNotConnected(PeerId),
}

pub type Result<T> = std::result::Result<T, ServerError>;
