//! Tag-prefixed lockstep messages
//!
//! Every message starts with one [`MessageTag`] byte followed by the fields of
//! that kind in a fixed order. Decoding consumes exactly those fields.

use crate::codec::{NetReader, NetWriter, MAX_ARRAY_LEN};
use crate::error::ProtocolError;

/// Identifies the kind of a lockstep message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageTag {
    StartSimulation = 0,
    Input = 1,
    Checksum = 2,
    Frame = 3,
    Shutdown = 4,
}

impl TryFrom<u8> for MessageTag {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageTag::StartSimulation),
            1 => Ok(MessageTag::Input),
            2 => Ok(MessageTag::Checksum),
            3 => Ok(MessageTag::Frame),
            4 => Ok(MessageTag::Shutdown),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

/// Sent once to each peer when the match begins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartSimulation {
    pub seed: i32,
    pub target_fps: i32,
    pub player_id: u8,
}

impl StartSimulation {
    pub fn serialize(&self, writer: &mut NetWriter) {
        writer.put_i32(self.seed);
        writer.put_i32(self.target_fps);
        writer.put_u8(self.player_id);
    }

    pub fn deserialize(reader: &mut NetReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            seed: reader.get_i32()?,
            target_fps: reader.get_i32()?,
            player_id: reader.get_u8()?,
        })
    }
}

/// A client's state fingerprint for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksum {
    pub frame_number: u64,
    pub value: i64,
}

impl Checksum {
    pub fn serialize(&self, writer: &mut NetWriter) {
        writer.put_u64(self.frame_number);
        writer.put_i64(self.value);
    }

    pub fn deserialize(reader: &mut NetReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            frame_number: reader.get_u64()?,
            value: reader.get_i64()?,
        })
    }
}

/// Decoded form of any lockstep message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    StartSimulation(StartSimulation),
    /// Opaque client input, forwarded untouched
    Input(Vec<u8>),
    Checksum(Checksum),
    /// Every input collected during one tick, in arrival order
    Frame(Vec<Vec<u8>>),
    Shutdown,
}

impl Message {
    pub fn tag(&self) -> MessageTag {
        match self {
            Message::StartSimulation(_) => MessageTag::StartSimulation,
            Message::Input(_) => MessageTag::Input,
            Message::Checksum(_) => MessageTag::Checksum,
            Message::Frame(_) => MessageTag::Frame,
            Message::Shutdown => MessageTag::Shutdown,
        }
    }

    /// Resets `writer` and composes this message into it
    pub fn write_to(&self, writer: &mut NetWriter) -> Result<(), ProtocolError> {
        writer.reset();
        writer.put_u8(self.tag() as u8);
        match self {
            Message::StartSimulation(start) => start.serialize(writer),
            Message::Input(data) => write_input_payload(writer, data)?,
            Message::Checksum(checksum) => checksum.serialize(writer),
            Message::Frame(inputs) => write_frame_payload(writer, inputs)?,
            Message::Shutdown => {}
        }
        Ok(())
    }

    /// Encodes into a freshly allocated buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut writer = NetWriter::new();
        self.write_to(&mut writer)?;
        Ok(writer.data().to_vec())
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = NetReader::new(data);
        let tag = read_tag(&mut reader)?;
        let message = match tag {
            MessageTag::StartSimulation => {
                Message::StartSimulation(StartSimulation::deserialize(&mut reader)?)
            }
            MessageTag::Input => Message::Input(read_input_payload(&mut reader)?.to_vec()),
            MessageTag::Checksum => Message::Checksum(Checksum::deserialize(&mut reader)?),
            MessageTag::Frame => Message::Frame(
                read_frame_payload(&mut reader)?
                    .into_iter()
                    .map(<[u8]>::to_vec)
                    .collect(),
            ),
            MessageTag::Shutdown => Message::Shutdown,
        };
        reader.expect_end()?;
        Ok(message)
    }
}

/// Reads the leading tag byte
pub fn read_tag(reader: &mut NetReader<'_>) -> Result<MessageTag, ProtocolError> {
    if reader.is_at_end() {
        return Err(ProtocolError::Empty);
    }
    MessageTag::try_from(reader.get_u8()?)
}

fn write_input_payload(writer: &mut NetWriter, data: &[u8]) -> Result<(), ProtocolError> {
    if data.len() > MAX_ARRAY_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            len: data.len(),
            max: MAX_ARRAY_LEN,
        });
    }
    writer.put_bytes(data);
    Ok(())
}

/// Reads the opaque input blob that follows an `Input` tag
///
/// Inputs are bounded so that they always fit in a frame's length prefix.
pub fn read_input_payload<'a>(reader: &mut NetReader<'a>) -> Result<&'a [u8], ProtocolError> {
    let len = reader.remaining();
    if len > MAX_ARRAY_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            len,
            max: MAX_ARRAY_LEN,
        });
    }
    Ok(reader.get_remaining_bytes())
}

fn write_frame_payload(writer: &mut NetWriter, inputs: &[Vec<u8>]) -> Result<(), ProtocolError> {
    let count = u16::try_from(inputs.len()).map_err(|_| ProtocolError::PayloadTooLarge {
        len: inputs.len(),
        max: MAX_ARRAY_LEN,
    })?;
    writer.put_u16(count);
    for input in inputs {
        writer.put_bytes_with_length(input)?;
    }
    Ok(())
}

/// Reads the inputs of a frame without copying them
pub fn read_frame_payload<'a>(reader: &mut NetReader<'a>) -> Result<Vec<&'a [u8]>, ProtocolError> {
    let count = reader.get_u16()? as usize;
    (0..count).map(|_| reader.get_bytes_with_length()).collect()
}
