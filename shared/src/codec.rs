//! Fixed-width binary field encoding for lockstep messages
//!
//! All integers are little-endian. Byte arrays are prefixed with a `u16` length
//! and numeric arrays with a `u16` element count.

use crate::error::ProtocolError;

/// Largest byte array or numeric array that fits behind a `u16` prefix
pub const MAX_ARRAY_LEN: usize = u16::MAX as usize;

/// Reusable scratch buffer for composing one message at a time
///
/// The buffer keeps its allocation between messages. Callers must `reset`
/// before building each new message so stale bytes never leak into the next one.
#[derive(Debug, Default)]
pub struct NetWriter {
    data: Vec<u8>,
}

impl NetWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Clears the buffer while keeping its capacity
    pub fn reset(&mut self) {
        self.data.clear();
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn put_i8(&mut self, value: i8) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i16(&mut self, value: i16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends raw bytes with no length prefix
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Appends a `u16` length followed by the bytes
    pub fn put_bytes_with_length(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let len = checked_array_len(bytes.len())?;
        self.put_u16(len);
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Appends a `u16` element count followed by each value
    pub fn put_i32_array(&mut self, values: &[i32]) -> Result<(), ProtocolError> {
        let len = checked_array_len(values.len())?;
        self.put_u16(len);
        for value in values {
            self.put_i32(*value);
        }
        Ok(())
    }

    pub fn put_u64_array(&mut self, values: &[u64]) -> Result<(), ProtocolError> {
        let len = checked_array_len(values.len())?;
        self.put_u16(len);
        for value in values {
            self.put_u64(*value);
        }
        Ok(())
    }
}

fn checked_array_len(len: usize) -> Result<u16, ProtocolError> {
    u16::try_from(len).map_err(|_| ProtocolError::PayloadTooLarge {
        len,
        max: MAX_ARRAY_LEN,
    })
}

/// Cursor over a received message, consuming fields in order
#[derive(Debug, Clone)]
pub struct NetReader<'a> {
    data: &'a [u8],
    position: usize,
}

macro_rules! get_le {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self) -> Result<$ty, ProtocolError> {
            let bytes = self.take(std::mem::size_of::<$ty>())?;
            let mut raw = [0u8; std::mem::size_of::<$ty>()];
            raw.copy_from_slice(bytes);
            Ok(<$ty>::from_le_bytes(raw))
        }
    };
}

impl<'a> NetReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], ProtocolError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(ProtocolError::UnexpectedEnd { needed, remaining });
        }
        let start = self.position;
        self.position += needed;
        Ok(&self.data[start..self.position])
    }

    get_le!(get_u8, u8);
    get_le!(get_i8, i8);
    get_le!(get_u16, u16);
    get_le!(get_i16, i16);
    get_le!(get_u32, u32);
    get_le!(get_i32, i32);
    get_le!(get_u64, u64);
    get_le!(get_i64, i64);

    /// Returns the next byte without consuming it
    pub fn peek_u8(&self) -> Result<u8, ProtocolError> {
        self.data
            .get(self.position)
            .copied()
            .ok_or(ProtocolError::UnexpectedEnd {
                needed: 1,
                remaining: 0,
            })
    }

    pub fn get_bytes_with_length(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = self.get_u16()? as usize;
        self.take(len)
    }

    pub fn get_i32_array(&mut self) -> Result<Vec<i32>, ProtocolError> {
        let count = self.get_u16()? as usize;
        (0..count).map(|_| self.get_i32()).collect()
    }

    pub fn get_u64_array(&mut self) -> Result<Vec<u64>, ProtocolError> {
        let count = self.get_u16()? as usize;
        (0..count).map(|_| self.get_u64()).collect()
    }

    /// Consumes and returns everything left in the message
    pub fn get_remaining_bytes(&mut self) -> &'a [u8] {
        let rest = &self.data[self.position..];
        self.position = self.data.len();
        rest
    }

    /// Fails if any bytes were left unread
    pub fn expect_end(&self) -> Result<(), ProtocolError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}
