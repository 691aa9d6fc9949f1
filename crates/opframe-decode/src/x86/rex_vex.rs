//! REX and VEX prefix detection.

use super::cursor::ByteCursor;
use super::mode::Mode;
use super::prefix::{PrefixGroup, PrefixSet};
use super::tables::OpcodeMap;
use crate::error::DecodeError;

/// 3-byte VEX lead byte (LES outside VEX context).
pub const VEX3: u8 = 0xC4;
/// 2-byte VEX lead byte (LDS outside VEX context).
pub const VEX2: u8 = 0xC5;

/// REX prefix fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rex {
    /// REX.W - 64-bit operand size
    pub w: bool,
    /// REX.R - extends ModR/M reg field
    pub r: bool,
    /// REX.X - extends SIB index field
    pub x: bool,
    /// REX.B - extends ModR/M r/m, SIB base, or opcode reg
    pub b: bool,
    /// Raw prefix byte
    pub byte: u8,
    /// Offset of the prefix within the instruction
    pub offset: usize,
}

impl Rex {
    /// Parse a REX byte.
    pub fn from_byte(byte: u8, offset: usize) -> Self {
        Self {
            w: byte & 0x08 != 0,
            r: byte & 0x04 != 0,
            x: byte & 0x02 != 0,
            b: byte & 0x01 != 0,
            byte,
            offset,
        }
    }

    /// Returns true if this REX prefix is "empty" (0x40).
    pub fn is_empty(&self) -> bool {
        !self.w && !self.r && !self.x && !self.b
    }
}

/// VEX prefix (used for AVX instructions).
/// Can be 2-byte (0xC5) or 3-byte (0xC4).
///
/// The R/X/B bits are stored with their REX meaning (set = extension),
/// and `vvvv` holds the register number, not the inverted encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vex {
    /// VEX.R (~REX.R) - extends ModR/M reg field
    pub r: bool,
    /// VEX.X (~REX.X) - extends SIB index field (only in 3-byte VEX)
    pub x: bool,
    /// VEX.B (~REX.B) - extends ModR/M r/m field (only in 3-byte VEX)
    pub b: bool,
    /// VEX.W - 64-bit operand size / opcode extension
    pub w: bool,
    /// VEX.vvvv - additional operand register
    pub vvvv: u8,
    /// VEX.L - vector length (0 = 128-bit/XMM, 1 = 256-bit/YMM)
    pub l: bool,
    /// VEX.pp - implied prefix (00=none, 01=0x66, 10=0xF3, 11=0xF2)
    pub pp: u8,
    /// VEX.mmmmm - implied escape bytes (1=0x0F, 2=0x0F38, 3=0x0F3A)
    pub mmmmm: u8,
    /// Offset of the lead byte within the instruction
    pub offset: usize,
}

impl Vex {
    /// Parse a 2-byte VEX prefix (0xC5 RvvvvLpp).
    pub fn from_2byte(byte1: u8, offset: usize) -> Self {
        Self {
            r: (byte1 & 0x80) == 0,
            x: false,
            b: false,
            w: false,
            vvvv: (!byte1 >> 3) & 0x0F,
            l: (byte1 & 0x04) != 0,
            pp: byte1 & 0x03,
            // 2-byte VEX implies the 0x0F escape
            mmmmm: 1,
            offset,
        }
    }

    /// Parse a 3-byte VEX prefix (0xC4 RXBmmmmm WvvvvLpp).
    pub fn from_3byte(byte1: u8, byte2: u8, offset: usize) -> Self {
        Self {
            r: (byte1 & 0x80) == 0,
            x: (byte1 & 0x40) == 0,
            b: (byte1 & 0x20) == 0,
            w: (byte2 & 0x80) != 0,
            vvvv: (!byte2 >> 3) & 0x0F,
            l: (byte2 & 0x04) != 0,
            pp: byte2 & 0x03,
            mmmmm: byte1 & 0x1F,
            offset,
        }
    }

    /// Returns the vector length in bits (128 or 256).
    pub fn vector_size(&self) -> u16 {
        if self.l { 256 } else { 128 }
    }

    /// Returns the implied legacy prefix byte (0x66, 0xF3, 0xF2, or None).
    pub fn implied_prefix(&self) -> Option<u8> {
        match self.pp {
            1 => Some(0x66),
            2 => Some(0xF3),
            3 => Some(0xF2),
            _ => None,
        }
    }

    /// Returns the opcode map selected by `mmmmm`, or `None` if reserved.
    pub fn opcode_map(&self) -> Option<OpcodeMap> {
        OpcodeMap::from_vex_map(self.mmmmm)
    }
}

/// The optional REX or VEX prefix of one instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RexOrVex {
    #[default]
    None,
    Rex(Rex),
    Vex2(Vex),
    Vex3(Vex),
}

impl RexOrVex {
    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Rex(_) => 1,
            Self::Vex2(_) => 2,
            Self::Vex3(_) => 3,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn rex(&self) -> Option<Rex> {
        match self {
            Self::Rex(rex) => Some(*rex),
            _ => None,
        }
    }

    pub fn vex(&self) -> Option<Vex> {
        match self {
            Self::Vex2(vex) | Self::Vex3(vex) => Some(*vex),
            _ => None,
        }
    }

    /// REX.W; VEX.W does not select operand size for immediates.
    pub fn rex_w(&self) -> bool {
        self.rex().map(|r| r.w).unwrap_or(false)
    }
}

/// Returns true if the byte at the cursor starts a VEX prefix.
///
/// Outside 64-bit mode C4/C5 are LES/LDS unless the next byte would be a
/// register-form ModR/M (bits 7:6 = 11), which LES/LDS cannot encode.
fn is_vex_lead(cursor: &ByteCursor<'_>, mode: Mode) -> bool {
    match mode {
        Mode::Mode64 => true,
        Mode::Mode16 | Mode::Mode32 => matches!(cursor.peek_at(1), Some(next) if next & 0xC0 == 0xC0),
    }
}

/// Detects an optional REX or VEX prefix immediately before the opcode.
pub fn detect_rex_vex(
    cursor: &mut ByteCursor<'_>,
    mode: Mode,
    prefixes: &PrefixSet,
) -> Result<RexOrVex, DecodeError> {
    let Some(byte) = cursor.peek() else {
        return Ok(RexOrVex::None);
    };
    let offset = cursor.position();

    match byte {
        0x40..=0x4F if mode == Mode::Mode64 => {
            cursor.read_u8()?;
            if let Some(next @ (VEX2 | VEX3)) = cursor.peek() {
                return Err(DecodeError::conflicting_prefix(
                    cursor.position(),
                    format!("VEX prefix {next:#04x} after REX prefix {byte:#04x}"),
                ));
            }
            Ok(RexOrVex::Rex(Rex::from_byte(byte, offset)))
        }
        VEX2 | VEX3 if is_vex_lead(cursor, mode) => {
            if let Some(slot) = prefixes
                .get(PrefixGroup::LockRep)
                .or(prefixes.get(PrefixGroup::OperandSize))
            {
                return Err(DecodeError::conflicting_prefix(
                    offset,
                    format!("VEX prefix after legacy prefix {:#04x}", slot.byte),
                ));
            }
            if byte == VEX2 {
                let raw = cursor.take(2)?;
                Ok(RexOrVex::Vex2(Vex::from_2byte(raw[1], offset)))
            } else {
                let raw = cursor.take(3)?;
                Ok(RexOrVex::Vex3(Vex::from_3byte(raw[1], raw[2], offset)))
            }
        }
        _ => Ok(RexOrVex::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(bytes: &[u8], mode: Mode) -> (Result<RexOrVex, DecodeError>, usize) {
        let mut cursor = ByteCursor::new(bytes);
        let result = detect_rex_vex(&mut cursor, mode, &PrefixSet::default());
        (result, cursor.position())
    }

    #[test]
    fn test_rex_in_long_mode() {
        let (result, consumed) = detect(&[0x48, 0x89, 0xE5], Mode::Mode64);
        let rex = result.unwrap().rex().unwrap();
        assert!(rex.w && !rex.r && !rex.x && !rex.b);
        assert_eq!(consumed, 1);

        let (result, _) = detect(&[0x40, 0x88, 0xC6], Mode::Mode64);
        assert!(result.unwrap().rex().unwrap().is_empty());
    }

    #[test]
    fn test_rex_range_is_opcode_outside_long_mode() {
        for mode in [Mode::Mode16, Mode::Mode32] {
            let (result, consumed) = detect(&[0x40], mode);
            assert_eq!(result.unwrap(), RexOrVex::None);
            assert_eq!(consumed, 0);
        }
    }

    #[test]
    fn test_vex2() {
        // vaddps ymm0, ymm1, ymm2: C5 F4 58 C2
        let (result, consumed) = detect(&[0xC5, 0xF4, 0x58, 0xC2], Mode::Mode64);
        let vex = result.unwrap().vex().unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(vex.vvvv, 1);
        assert!(vex.l);
        assert_eq!(vex.vector_size(), 256);
        assert_eq!(vex.opcode_map(), Some(OpcodeMap::TwoByte));
        assert!(!vex.r && !vex.x && !vex.b);
    }

    #[test]
    fn test_vex3() {
        // vpermq ymm0, ymm1, 0x1b: C4 E3 FD 00 C1 1B
        let (result, consumed) = detect(&[0xC4, 0xE3, 0xFD, 0x00, 0xC1, 0x1B], Mode::Mode64);
        let form = result.unwrap();
        assert!(matches!(form, RexOrVex::Vex3(_)));
        let vex = form.vex().unwrap();
        assert_eq!(consumed, 3);
        assert!(vex.w);
        assert_eq!(vex.opcode_map(), Some(OpcodeMap::ThreeByte3A));
        assert_eq!(vex.implied_prefix(), Some(0x66));
        assert!(!form.rex_w());
    }

    #[test]
    fn test_les_lds_outside_long_mode() {
        // lds eax, [eax]: C5 00
        let (result, consumed) = detect(&[0xC5, 0x00], Mode::Mode32);
        assert_eq!(result.unwrap(), RexOrVex::None);
        assert_eq!(consumed, 0);

        // Register-form second byte makes it VEX.
        let (result, consumed) = detect(&[0xC5, 0xF8, 0x77], Mode::Mode32);
        assert!(matches!(result.unwrap(), RexOrVex::Vex2(_)));
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_rex_then_vex_conflicts() {
        let (result, consumed) = detect(&[0x48, 0xC5, 0xF8, 0x77], Mode::Mode64);
        assert!(matches!(
            result,
            Err(DecodeError::ConflictingPrefixForm { offset: 1, .. })
        ));
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_vex_after_rep_conflicts() {
        let bytes = [0xF3, 0xC5, 0xF8, 0x77];
        let mut cursor = ByteCursor::new(&bytes);
        let prefixes = crate::x86::prefix::scan_prefixes(&mut cursor, Mode::Mode64).unwrap();
        let result = detect_rex_vex(&mut cursor, Mode::Mode64, &prefixes);
        assert!(matches!(
            result,
            Err(DecodeError::ConflictingPrefixForm { offset: 1, .. })
        ));
    }

    #[test]
    fn test_truncated_vex() {
        let (result, _) = detect(&[0xC4, 0xE2], Mode::Mode64);
        assert_eq!(result, Err(DecodeError::truncated(3, 2)));
    }
}
