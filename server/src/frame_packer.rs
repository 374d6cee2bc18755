//! Input aggregation and frame packing
//!
//! Inputs arrive on the room's event context through an [`InputSink`] and are
//! queued on an unbounded channel. The tick loop owns the matching
//! [`FramePacker`], which drains the queue once per tick and serializes
//! everything it found into one frame. Draining and appending never block each
//! other, and every input lands in exactly one frame.
//!
//! A frame never exceeds [`MAX_PACKET_SIZE`]. When the queue holds more than
//! fits, the first input that would overflow is carried over and opens the
//! next frame, so a burst of large inputs is spread over several ticks.

use log::{debug, trace};
use shared::codec::MAX_ARRAY_LEN;
use shared::handshake::MAX_PACKET_SIZE;
use shared::{MessageTag, NetWriter, ProtocolError};
use tokio::sync::mpsc;

/// Most inputs one frame can carry; anything beyond waits for the next tick
pub const MAX_INPUTS_PER_FRAME: usize = u16::MAX as usize;

/// Tag byte plus the u16 input count
const FRAME_HEADER_LEN: usize = 3;

/// Wire size of one input inside a frame
fn encoded_len(input: &[u8]) -> usize {
    2 + input.len()
}

/// Creates a connected sink/packer pair for one match
pub fn input_channel() -> (InputSink, FramePacker) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        InputSink { tx },
        FramePacker {
            rx,
            writer: NetWriter::with_capacity(256),
            pending: Vec::new(),
            carried: None,
            frames_packed: 0,
        },
    )
}

/// Producer half, used by the event context
#[derive(Debug, Clone)]
pub struct InputSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl InputSink {
    /// Queues an opaque input for the currently open tick
    ///
    /// Returns `Ok(false)` when the packer has already been dropped.
    pub fn add_input(&self, input: Vec<u8>) -> Result<bool, ProtocolError> {
        if input.len() > MAX_ARRAY_LEN {
            return Err(ProtocolError::PayloadTooLarge {
                len: input.len(),
                max: MAX_ARRAY_LEN,
            });
        }
        Ok(self.tx.send(input).is_ok())
    }
}

/// Consumer half, owned by the tick loop
///
/// Holds the scratch buffer frames are composed in; the buffer is reset at the
/// start of every `pack`.
#[derive(Debug)]
pub struct FramePacker {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    writer: NetWriter,
    pending: Vec<Vec<u8>>,
    /// Input drained last tick that did not fit in that frame
    carried: Option<Vec<u8>>,
    frames_packed: u64,
}

impl FramePacker {
    /// Serializes every input queued since the previous call as one frame
    ///
    /// Always produces a valid frame; with nothing queued it is an empty frame,
    /// which still has to be broadcast to keep the clients' tick cadence.
    pub fn pack(&mut self) -> &[u8] {
        self.pending.clear();
        let mut size = FRAME_HEADER_LEN;
        while self.pending.len() < MAX_INPUTS_PER_FRAME {
            let input = match self.carried.take() {
                Some(input) => input,
                None => match self.rx.try_recv() {
                    Ok(input) => input,
                    Err(_) => break,
                },
            };
            // A single input always fits, so a frame is never left empty
            // while inputs are waiting
            if size + encoded_len(&input) > MAX_PACKET_SIZE {
                debug!(
                    "Frame full at {} inputs, carrying the rest to the next tick",
                    self.pending.len()
                );
                self.carried = Some(input);
                break;
            }
            size += encoded_len(&input);
            self.pending.push(input);
        }

        self.writer.reset();
        self.writer.put_u8(MessageTag::Frame as u8);
        self.writer.put_u16(self.pending.len() as u16);
        for input in &self.pending {
            // InputSink bounds every input to MAX_ARRAY_LEN
            self.writer.put_u16(input.len() as u16);
            self.writer.put_bytes(input);
        }

        self.frames_packed += 1;
        trace!(
            "Packed frame {} with {} inputs ({} bytes)",
            self.frames_packed,
            self.pending.len(),
            self.writer.len()
        );
        self.writer.data()
    }

    /// Number of frames produced so far
    pub fn frames_packed(&self) -> u64 {
        self.frames_packed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Message;

    fn decode_frame(bytes: &[u8]) -> Vec<Vec<u8>> {
        match Message::decode(bytes).unwrap() {
            Message::Frame(inputs) => inputs,
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_pack_is_valid_frame() {
        let (_sink, mut packer) = input_channel();
        let frame = packer.pack().to_vec();
        assert_eq!(frame, vec![MessageTag::Frame as u8, 0, 0]);
        assert!(decode_frame(&frame).is_empty());
        assert_eq!(packer.frames_packed(), 1);
    }

    #[test]
    fn test_pack_keeps_arrival_order() {
        let (sink, mut packer) = input_channel();
        for i in 0..10u8 {
            assert!(sink.add_input(vec![i, i]).unwrap());
        }
        let inputs = decode_frame(packer.pack());
        assert_eq!(inputs.len(), 10);
        for (i, input) in inputs.iter().enumerate() {
            assert_eq!(input, &vec![i as u8, i as u8]);
        }
    }

    #[test]
    fn test_pack_clears_buffer() {
        let (sink, mut packer) = input_channel();
        sink.add_input(vec![1]).unwrap();
        sink.add_input(vec![2]).unwrap();
        assert_eq!(decode_frame(packer.pack()).len(), 2);
        assert!(decode_frame(packer.pack()).is_empty());

        sink.add_input(vec![3]).unwrap();
        assert_eq!(decode_frame(packer.pack()), vec![vec![3]]);
    }

    #[test]
    fn test_inputs_from_many_sinks_interleave_in_arrival_order() {
        let (sink_a, mut packer) = input_channel();
        let sink_b = sink_a.clone();
        sink_a.add_input(b"a1".to_vec()).unwrap();
        sink_b.add_input(b"b1".to_vec()).unwrap();
        sink_a.add_input(b"a2".to_vec()).unwrap();
        assert_eq!(
            decode_frame(packer.pack()),
            vec![b"a1".to_vec(), b"b1".to_vec(), b"a2".to_vec()]
        );
    }

    #[test]
    fn test_empty_input_blob_is_kept() {
        let (sink, mut packer) = input_channel();
        sink.add_input(Vec::new()).unwrap();
        assert_eq!(decode_frame(packer.pack()), vec![Vec::<u8>::new()]);
    }

    #[test]
    fn test_oversized_input_rejected() {
        let (sink, mut packer) = input_channel();
        let result = sink.add_input(vec![0; MAX_ARRAY_LEN + 1]);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));
        assert!(decode_frame(packer.pack()).is_empty());
    }

    #[test]
    fn test_large_burst_is_split_across_frames() {
        let (sink, mut packer) = input_channel();
        for i in 0..17u8 {
            sink.add_input(vec![i; MAX_ARRAY_LEN]).unwrap();
        }

        let mut received = Vec::new();
        let mut frames = 0;
        while received.len() < 17 {
            let frame = packer.pack();
            assert!(frame.len() <= MAX_PACKET_SIZE, "frame of {} bytes", frame.len());
            received.extend(decode_frame(frame));
            frames += 1;
            assert!(frames <= 3, "inputs were lost");
        }

        assert_eq!(frames, 2);
        for (i, input) in received.iter().enumerate() {
            assert_eq!(input.len(), MAX_ARRAY_LEN);
            assert!(input.iter().all(|b| *b == i as u8));
        }
        assert!(decode_frame(packer.pack()).is_empty());
    }

    #[test]
    fn test_carried_input_precedes_newer_ones() {
        let (sink, mut packer) = input_channel();
        for i in 0..16u8 {
            sink.add_input(vec![i; MAX_ARRAY_LEN]).unwrap();
        }
        assert_eq!(decode_frame(packer.pack()).len(), 15);

        sink.add_input(vec![99]).unwrap();
        let next = decode_frame(packer.pack());
        assert_eq!(next.len(), 2);
        assert_eq!(next[0], vec![15; MAX_ARRAY_LEN]);
        assert_eq!(next[1], vec![99]);
    }

    #[test]
    fn test_add_after_packer_dropped() {
        let (sink, packer) = input_channel();
        drop(packer);
        assert!(!sink.add_input(vec![1]).unwrap());
    }

    #[test]
    fn test_concurrent_append_and_drain_loses_nothing() {
        let (sink, mut packer) = input_channel();
        let producers: Vec<_> = (0..4u8)
            .map(|p| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for i in 0..500u16 {
                        let [lo, hi] = i.to_le_bytes();
                        sink.add_input(vec![p, lo, hi]).unwrap();
                    }
                })
            })
            .collect();

        let mut received = Vec::new();
        while received.len() < 2000 {
            received.extend(decode_frame(packer.pack()));
            std::thread::yield_now();
        }
        for producer in producers {
            producer.join().unwrap();
        }
        received.extend(decode_frame(packer.pack()));

        assert_eq!(received.len(), 2000);
        // Per-producer order survives
        for p in 0..4u8 {
            let sequence: Vec<u16> = received
                .iter()
                .filter(|input| input[0] == p)
                .map(|input| u16::from_le_bytes([input[1], input[2]]))
                .collect();
            assert_eq!(sequence, (0..500).collect::<Vec<_>>());
        }
    }
}
