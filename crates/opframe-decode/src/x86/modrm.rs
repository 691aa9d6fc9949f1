//! ModR/M and SIB byte decoding.

use super::attributes::AttributeBits;
use super::cursor::ByteCursor;
use crate::error::DecodeError;

/// Decoded ModR/M byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModRm {
    /// Raw byte
    pub byte: u8,
    /// Offset within the instruction
    pub offset: usize,
    /// Mod field (2 bits)
    pub mod_: u8,
    /// Reg field (3 bits)
    pub reg: u8,
    /// R/M field (3 bits)
    pub rm: u8,
}

impl ModRm {
    pub fn parse(byte: u8, offset: usize) -> Self {
        Self {
            byte,
            offset,
            mod_: (byte >> 6) & 0x3,
            reg: (byte >> 3) & 0x7,
            rm: byte & 0x7,
        }
    }

    /// Returns true if this ModR/M encodes a register operand (mod=11).
    pub fn is_register(&self) -> bool {
        self.mod_ == 0b11
    }

    /// Returns true if this ModR/M is followed by a SIB byte under the
    /// given address size. 16-bit addressing has no SIB form.
    pub fn needs_sib(&self, address_size: u16) -> bool {
        address_size != 16 && self.mod_ != 0b11 && self.rm == 0b100
    }
}

/// Decoded SIB byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sib {
    /// Raw byte
    pub byte: u8,
    /// Offset within the instruction
    pub offset: usize,
    /// Scale (2 bits) - actual scale is 1 << scale
    pub scale: u8,
    /// Index register (3 bits)
    pub index: u8,
    /// Base register (3 bits)
    pub base: u8,
}

impl Sib {
    pub fn parse(byte: u8, offset: usize) -> Self {
        Self {
            byte,
            offset,
            scale: (byte >> 6) & 0x3,
            index: (byte >> 3) & 0x7,
            base: byte & 0x7,
        }
    }

    /// Returns the actual scale factor (1, 2, 4, or 8).
    pub fn scale_factor(&self) -> u8 {
        1 << self.scale
    }
}

/// Reads the ModR/M byte and, when the addressing form calls for it, the SIB byte.
///
/// Leaves the cursor untouched when `attrs` has no ModR/M.
pub fn decode_modrm_sib(
    cursor: &mut ByteCursor<'_>,
    attrs: AttributeBits,
    address_size: u16,
) -> Result<(Option<ModRm>, Option<Sib>), DecodeError> {
    if !attrs.has_modrm() {
        return Ok((None, None));
    }

    let offset = cursor.position();
    let modrm = ModRm::parse(cursor.read_u8()?, offset);

    let sib = if modrm.needs_sib(address_size) {
        let offset = cursor.position();
        Some(Sib::parse(cursor.read_u8()?, offset))
    } else {
        None
    };

    if attrs.requires_sib() && sib.is_none() {
        return Err(DecodeError::MissingSib { offset });
    }

    Ok((Some(modrm), sib))
}
