//! Bounds-checked read cursor over instruction bytes.

use super::MAX_INSTRUCTION_LEN;
use crate::error::DecodeError;

/// An immutable byte view plus a read position.
///
/// Every consuming read is checked against the architectural length
/// limit first and then against the end of the supplied buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The full underlying buffer.
    pub fn buffer(&self) -> &'a [u8] {
        self.bytes
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    /// Returns the next byte without consuming it.
    pub fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    /// Returns the byte `ahead` positions past the cursor without consuming it.
    pub fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    /// Verifies that `count` more bytes can be consumed.
    pub fn ensure(&self, count: usize) -> Result<(), DecodeError> {
        let needed = self.pos + count;
        if needed > MAX_INSTRUCTION_LEN {
            return Err(DecodeError::too_long(needed));
        }
        if needed > self.bytes.len() {
            return Err(DecodeError::truncated(needed, self.bytes.len()));
        }
        Ok(())
    }

    /// Consumes a single byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.ensure(1)?;
        let byte = self.bytes[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Consumes `count` bytes and returns them.
    pub fn take(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(count)?;
        let start = self.pos;
        self.pos += count;
        Ok(&self.bytes[start..self.pos])
    }
}
