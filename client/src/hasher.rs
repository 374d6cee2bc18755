//! Deterministic fingerprint over the frames a client has applied
//!
//! Stands in for a real simulation's state hash: two clients that started
//! with the same seed and applied the same frames produce the same value.

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHasher {
    state: u64,
    frames: u64,
}

impl FrameHasher {
    pub fn new(seed: i32) -> Self {
        let mut hasher = Self {
            state: FNV_OFFSET,
            frames: 0,
        };
        hasher.mix(&seed.to_le_bytes());
        hasher
    }

    fn mix(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= u64::from(*byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    /// Folds one frame's inputs, in order, into the fingerprint
    pub fn apply_frame(&mut self, inputs: &[Vec<u8>]) {
        self.frames += 1;
        let frame_number = self.frames.to_le_bytes();
        self.mix(&frame_number);
        for input in inputs {
            self.mix(&(input.len() as u32).to_le_bytes());
            self.mix(input);
        }
    }

    /// Number of frames applied so far; also the current frame number
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn value(&self) -> i64 {
        self.state as i64
    }
}
