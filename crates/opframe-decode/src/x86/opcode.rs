//! Opcode resolution through the escape maps.

use super::attributes::AttributeBits;
use super::cursor::ByteCursor;
use super::mode::Mode;
use super::rex_vex::RexOrVex;
use super::tables::{OpcodeMap, OpcodeTables, THREE_BYTE_38_ESCAPE, THREE_BYTE_3A_ESCAPE};
use crate::error::DecodeError;

/// A resolved opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OpcodeRef {
    /// Map the opcode was looked up in.
    pub map: OpcodeMap,
    /// Final opcode byte.
    pub opcode: u8,
    /// Offset of the final opcode byte within the instruction.
    pub offset: usize,
    /// Bytes consumed for the opcode, escape bytes included.
    pub length: usize,
    /// Attributes of the opcode.
    pub attrs: AttributeBits,
}

/// Resolves the opcode at the cursor.
///
/// Without VEX, escape bytes (0F, then 38 or 3A) select the map. With VEX
/// the map is implied by `VEX.mmmmm` and a single opcode byte follows.
pub fn resolve_opcode(
    cursor: &mut ByteCursor<'_>,
    tables: &OpcodeTables,
    mode: Mode,
    rex_vex: &RexOrVex,
) -> Result<OpcodeRef, DecodeError> {
    let start = cursor.position();

    let (map, opcode, offset) = match rex_vex.vex() {
        Some(vex) => {
            let offset = cursor.position();
            let opcode = cursor.read_u8()?;
            // Reserved VEX.mmmmm values name no map at all
            let map = vex
                .opcode_map()
                .ok_or_else(|| DecodeError::unknown_opcode(OpcodeMap::TwoByte, opcode, offset))?;
            (map, opcode, offset)
        }
        None => escape_dispatch(cursor, tables)?,
    };

    let attrs = tables
        .get(map, opcode)
        .filter(|attrs| attrs.is_opcode())
        .ok_or_else(|| DecodeError::unknown_opcode(map, opcode, offset))?;

    // Opcodes that only exist outside long mode (INC/DEC row, PUSH ES, AAA, ...)
    if mode == Mode::Mode64 && !attrs.allows_rex() {
        return Err(DecodeError::unknown_opcode(map, opcode, offset));
    }
    let has_vex = rex_vex.vex().is_some();
    if (has_vex && !attrs.allows_vex()) || (!has_vex && attrs.requires_vex()) {
        return Err(DecodeError::unknown_opcode(map, opcode, offset));
    }

    Ok(OpcodeRef {
        map,
        opcode,
        offset,
        length: cursor.position() - start,
        attrs,
    })
}

/// Consumes escape bytes and the final opcode byte.
/// Returns the selected map, the opcode and its offset.
fn escape_dispatch(
    cursor: &mut ByteCursor<'_>,
    tables: &OpcodeTables,
) -> Result<(OpcodeMap, u8, usize), DecodeError> {
    let first_offset = cursor.position();
    let first = cursor.read_u8()?;
    if !is_escape(tables, OpcodeMap::Primary, first) {
        return Ok((OpcodeMap::Primary, first, first_offset));
    }

    let second_offset = cursor.position();
    let second = cursor.read_u8()?;
    if !is_escape(tables, OpcodeMap::TwoByte, second) {
        return Ok((OpcodeMap::TwoByte, second, second_offset));
    }

    let map = match second {
        THREE_BYTE_3A_ESCAPE => OpcodeMap::ThreeByte3A,
        THREE_BYTE_38_ESCAPE => OpcodeMap::ThreeByte38,
        _ => return Err(DecodeError::unknown_opcode(OpcodeMap::TwoByte, second, second_offset)),
    };
    let offset = cursor.position();
    Ok((map, cursor.read_u8()?, offset))
}

fn is_escape(tables: &OpcodeTables, map: OpcodeMap, byte: u8) -> bool {
    tables.get(map, byte).map(|attrs| attrs.is_escape()).unwrap_or(false)
}
