use thiserror::Error;

/// Failure to decode a message received over the lockstep channel.
///
/// Any of these leaves the reader misaligned with the sender, so the receiving
/// side drops the message and treats the peer as broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("unexpected end of message: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    #[error("{0:?} messages are not accepted from this side")]
    UnsupportedTag(crate::MessageTag),
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
    #[error("payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge { len: usize, max: usize },
}
