//! Displacement and immediate sizing.

use std::ops::Range;

use super::attributes::AttributeBits;
use super::cursor::ByteCursor;
use super::mode::{EffectiveSizes, Mode};
use super::modrm::{ModRm, Sib};
use crate::error::DecodeError;

/// A contiguous run of instruction bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldSpan {
    pub offset: usize,
    pub len: usize,
}

impl FieldSpan {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }
}

/// Displacement and immediate spans of one instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrailingFields {
    pub displacement: Option<FieldSpan>,
    pub immediate: Option<FieldSpan>,
}

/// Returns the displacement length in bytes.
pub fn displacement_len(
    attrs: AttributeBits,
    modrm: Option<&ModRm>,
    sib: Option<&Sib>,
    address_size: u16,
) -> usize {
    let Some(modrm) = modrm else {
        // moffs forms carry a full address
        return if attrs.has_moffs() { (address_size / 8) as usize } else { 0 };
    };

    match (address_size, modrm.mod_) {
        (_, 0b11) => 0,
        (16, 0b00) => {
            if modrm.rm == 0b110 { 2 } else { 0 }
        }
        (16, 0b01) => 1,
        (16, _) => 2,
        (_, 0b00) => {
            // [disp32] / [rip+disp32], or SIB with no base
            let sib_no_base = sib.map(|s| s.base == 0b101).unwrap_or(false);
            if modrm.rm == 0b101 || sib_no_base { 4 } else { 0 }
        }
        (_, 0b01) => 1,
        _ => 4,
    }
}

/// Returns the total immediate length in bytes.
pub fn immediate_len(attrs: AttributeBits, modrm: Option<&ModRm>, sizes: EffectiveSizes) -> usize {
    if !attrs.has_immediate() {
        return 0;
    }
    if attrs.contains(AttributeBits::TEST_ONLY_IMM) && modrm.map(|m| m.reg > 1).unwrap_or(false) {
        return 0;
    }

    let z = if sizes.operand == 16 { 2 } else { 4 };
    let mut len = 0;
    if attrs.contains(AttributeBits::IMM8) {
        len += 1;
    }
    if attrs.contains(AttributeBits::IMM16) {
        len += 2;
    }
    if attrs.contains(AttributeBits::IMM_Z) {
        len += z;
    }
    if attrs.contains(AttributeBits::IMM_V) {
        len += (sizes.operand / 8) as usize;
    }
    if attrs.contains(AttributeBits::REL_Z) {
        // Near branches ignore 0x66 in 64-bit mode
        len += if sizes.mode == Mode::Mode64 { 4 } else { z };
    }
    len
}

/// Sizes and consumes the displacement and immediate that follow ModR/M.
///
/// The spans are recorded, not interpreted.
pub fn size_trailing_fields(
    cursor: &mut ByteCursor<'_>,
    attrs: AttributeBits,
    modrm: Option<&ModRm>,
    sib: Option<&Sib>,
    sizes: EffectiveSizes,
) -> Result<TrailingFields, DecodeError> {
    let displacement = take_span(cursor, displacement_len(attrs, modrm, sib, sizes.address))?;
    let immediate = take_span(cursor, immediate_len(attrs, modrm, sizes))?;
    Ok(TrailingFields {
        displacement,
        immediate,
    })
}

fn take_span(cursor: &mut ByteCursor<'_>, len: usize) -> Result<Option<FieldSpan>, DecodeError> {
    if len == 0 {
        return Ok(None);
    }
    let offset = cursor.position();
    cursor.take(len)?;
    Ok(Some(FieldSpan { offset, len }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: AttributeBits = AttributeBits::MODRM;

    fn sizes(mode: Mode, opsize: bool, addrsize: bool, rex_w: bool) -> EffectiveSizes {
        EffectiveSizes::new(mode, opsize, addrsize, rex_w)
    }

    fn imm(extra: AttributeBits) -> AttributeBits {
        AttributeBits::OPCODE | AttributeBits::IMMEDIATE | extra
    }

    #[test]
    fn test_displacement_32() {
        let disp = |byte: u8, sib: Option<u8>| {
            let modrm = ModRm::parse(byte, 0);
            let sib = sib.map(|s| Sib::parse(s, 1));
            displacement_len(M, Some(&modrm), sib.as_ref(), 32)
        };
        assert_eq!(disp(0x00, None), 0);
        assert_eq!(disp(0x05, None), 4);
        assert_eq!(disp(0x04, Some(0x25)), 4);
        assert_eq!(disp(0x04, Some(0x24)), 0);
        assert_eq!(disp(0x45, None), 1);
        assert_eq!(disp(0x85, None), 4);
        assert_eq!(disp(0xC5, None), 0);
    }

    #[test]
    fn test_displacement_16() {
        let disp = |byte: u8| displacement_len(M, Some(&ModRm::parse(byte, 0)), None, 16);
        assert_eq!(disp(0x06), 2);
        assert_eq!(disp(0x05), 0);
        assert_eq!(disp(0x47), 1);
        assert_eq!(disp(0x87), 2);
        assert_eq!(disp(0xC0), 0);
    }

    #[test]
    fn test_moffs_follows_address_size() {
        assert_eq!(displacement_len(AttributeBits::DISPLACEMENT, None, None, 16), 2);
        assert_eq!(displacement_len(AttributeBits::DISPLACEMENT, None, None, 32), 4);
        assert_eq!(displacement_len(AttributeBits::DISPLACEMENT, None, None, 64), 8);
        assert_eq!(displacement_len(AttributeBits::OPCODE, None, None, 64), 0);
    }

    #[test]
    fn test_immediate_widths() {
        let iz = imm(AttributeBits::IMM_Z);
        assert_eq!(immediate_len(iz, None, sizes(Mode::Mode32, false, false, false)), 4);
        assert_eq!(immediate_len(iz, None, sizes(Mode::Mode32, true, false, false)), 2);
        assert_eq!(immediate_len(iz, None, sizes(Mode::Mode16, false, false, false)), 2);
        assert_eq!(immediate_len(iz, None, sizes(Mode::Mode64, false, false, true)), 4);

        let iv = imm(AttributeBits::IMM_V);
        assert_eq!(immediate_len(iv, None, sizes(Mode::Mode64, false, false, true)), 8);
        assert_eq!(immediate_len(iv, None, sizes(Mode::Mode64, true, false, false)), 2);

        let rel = imm(AttributeBits::REL_Z);
        assert_eq!(immediate_len(rel, None, sizes(Mode::Mode64, true, false, false)), 4);
        assert_eq!(immediate_len(rel, None, sizes(Mode::Mode32, true, false, false)), 2);

        let enter = imm(AttributeBits::IMM16 | AttributeBits::IMM8);
        assert_eq!(immediate_len(enter, None, sizes(Mode::Mode32, false, false, false)), 3);

        let far = imm(AttributeBits::IMM_Z | AttributeBits::IMM16);
        assert_eq!(immediate_len(far, None, sizes(Mode::Mode16, false, false, false)), 4);
        assert_eq!(immediate_len(far, None, sizes(Mode::Mode32, false, false, false)), 6);
    }

    #[test]
    fn test_group3_immediate() {
        let attrs = M | imm(AttributeBits::IMM_Z | AttributeBits::TEST_ONLY_IMM);
        let s = sizes(Mode::Mode32, false, false, false);
        // F7 /0 test
        assert_eq!(immediate_len(attrs, Some(&ModRm::parse(0xC0, 0)), s), 4);
        // F7 /2 not
        assert_eq!(immediate_len(attrs, Some(&ModRm::parse(0xD0, 0)), s), 0);
    }

    #[test]
    fn test_size_trailing_fields() {
        // 81 80 disp32 imm32: add dword [eax+0x10], 1
        let bytes = [0x81, 0x80, 0x10, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        let mut cursor = ByteCursor::new(&bytes);
        cursor.take(2).unwrap();
        let modrm = ModRm::parse(0x80, 1);
        let attrs = M | imm(AttributeBits::IMM_Z);
        let fields = size_trailing_fields(
            &mut cursor,
            attrs,
            Some(&modrm),
            None,
            sizes(Mode::Mode32, false, false, false),
        )
        .unwrap();
        assert_eq!(fields.displacement, Some(FieldSpan { offset: 2, len: 4 }));
        assert_eq!(fields.immediate, Some(FieldSpan { offset: 6, len: 4 }));
        assert_eq!(cursor.position(), 10);
    }

    #[test]
    fn test_truncated_immediate() {
        let bytes = [0xB8, 0x01, 0x02];
        let mut cursor = ByteCursor::new(&bytes);
        cursor.take(1).unwrap();
        let result = size_trailing_fields(
            &mut cursor,
            imm(AttributeBits::IMM_V),
            None,
            None,
            sizes(Mode::Mode32, false, false, false),
        );
        assert_eq!(result, Err(DecodeError::truncated(5, 3)));
    }
}
