//! The decoded instruction record.

use super::fields::FieldSpan;
use super::mode::Mode;
use super::modrm::{ModRm, Sib};
use super::opcode::OpcodeRef;
use super::prefix::PrefixSet;
use super::rex_vex::RexOrVex;

/// Structural fields of one decoded instruction.
///
/// Produced by [`X86Decoder::decode`](super::X86Decoder::decode) and never
/// modified afterwards. Field offsets are relative to the first byte of
/// the instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecodedInstruction {
    pub(crate) mode: Mode,
    pub(crate) bytes: Vec<u8>,
    pub(crate) prefixes: PrefixSet,
    pub(crate) rex_vex: RexOrVex,
    pub(crate) opcode: OpcodeRef,
    pub(crate) modrm: Option<ModRm>,
    pub(crate) sib: Option<Sib>,
    pub(crate) displacement: Option<FieldSpan>,
    pub(crate) immediate: Option<FieldSpan>,
    pub(crate) operand_size: u16,
    pub(crate) address_size: u16,
}

/// Byte count of each field, in encoding order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldLengths {
    pub prefixes: usize,
    pub rex_vex: usize,
    pub opcode: usize,
    pub modrm: usize,
    pub sib: usize,
    pub displacement: usize,
    pub immediate: usize,
}

impl FieldLengths {
    pub fn total(&self) -> usize {
        self.prefixes
            + self.rex_vex
            + self.opcode
            + self.modrm
            + self.sib
            + self.displacement
            + self.immediate
    }
}

impl DecodedInstruction {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Total instruction length in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// The instruction bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn prefixes(&self) -> &PrefixSet {
        &self.prefixes
    }

    pub fn rex_vex(&self) -> &RexOrVex {
        &self.rex_vex
    }

    pub fn opcode(&self) -> &OpcodeRef {
        &self.opcode
    }

    pub fn modrm(&self) -> Option<&ModRm> {
        self.modrm.as_ref()
    }

    pub fn sib(&self) -> Option<&Sib> {
        self.sib.as_ref()
    }

    pub fn displacement(&self) -> Option<FieldSpan> {
        self.displacement
    }

    pub fn immediate(&self) -> Option<FieldSpan> {
        self.immediate
    }

    /// Effective operand size in bits.
    pub fn operand_size(&self) -> u16 {
        self.operand_size
    }

    /// Effective address size in bits.
    pub fn address_size(&self) -> u16 {
        self.address_size
    }

    /// The legacy prefix bytes.
    pub fn prefix_bytes(&self) -> &[u8] {
        &self.bytes[..self.prefixes.len()]
    }

    /// The REX or VEX prefix bytes, empty if absent.
    pub fn rex_vex_bytes(&self) -> &[u8] {
        let start = self.prefixes.len();
        &self.bytes[start..start + self.rex_vex.len()]
    }

    /// Opcode bytes, escape bytes included.
    pub fn opcode_bytes(&self) -> &[u8] {
        let end = self.opcode.offset + 1;
        &self.bytes[end - self.opcode.length..end]
    }

    /// The raw displacement bytes (little-endian, uninterpreted).
    pub fn displacement_bytes(&self) -> Option<&[u8]> {
        self.displacement.map(|span| &self.bytes[span.range()])
    }

    /// The raw immediate bytes (little-endian, uninterpreted).
    pub fn immediate_bytes(&self) -> Option<&[u8]> {
        self.immediate.map(|span| &self.bytes[span.range()])
    }

    /// Byte count of each field.
    pub fn field_lengths(&self) -> FieldLengths {
        FieldLengths {
            prefixes: self.prefixes.len(),
            rex_vex: self.rex_vex.len(),
            opcode: self.opcode.length,
            modrm: self.modrm.map(|_| 1).unwrap_or(0),
            sib: self.sib.map(|_| 1).unwrap_or(0),
            displacement: self.displacement.map(|d| d.len).unwrap_or(0),
            immediate: self.immediate.map(|i| i.len).unwrap_or(0),
        }
    }
}
