//! Decoder traits.

use tracing::debug;

use crate::error::InvalidInstruction;
use crate::x86::{DecodedInstruction, Mode, MAX_INSTRUCTION_LEN};

/// One entry of a block decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    /// Offset of the first byte within the block.
    pub offset: usize,
    /// Decode result at that offset.
    pub result: Result<DecodedInstruction, InvalidInstruction>,
}

/// Trait for instruction framing decoders.
pub trait InstructionDecoder {
    /// Decode a single instruction starting at the first byte of `bytes`.
    ///
    /// # Returns
    /// The decoded fields, or the reason the bytes do not form a valid
    /// instruction together with the number of bytes consumed.
    fn decode(&self, bytes: &[u8]) -> Result<DecodedInstruction, InvalidInstruction>;

    /// Returns the addressing mode of this decoder.
    fn mode(&self) -> Mode;

    /// Returns the minimum instruction size.
    fn min_instruction_size(&self) -> usize {
        1
    }

    /// Returns the maximum instruction size.
    fn max_instruction_size(&self) -> usize {
        MAX_INSTRUCTION_LEN
    }

    /// Decode a block of code into consecutive instructions.
    fn decode_block(&self, bytes: &[u8]) -> Vec<BlockEntry> {
        let mut entries = Vec::new();
        let mut offset = 0;

        while offset < bytes.len() {
            let result = self.decode(&bytes[offset..]);
            let step = match &result {
                Ok(decoded) => decoded.size(),
                Err(invalid) => {
                    // On error, skip one byte and continue
                    debug!(offset, error = %invalid.error, "resynchronizing after invalid instruction");
                    1
                }
            };
            entries.push(BlockEntry { offset, result });
            offset += step;
        }

        entries
    }
}
