//! Decoding error types.

use thiserror::Error;

use crate::x86::prefix::PrefixGroup;
use crate::x86::tables::OpcodeMap;

/// Error type for instruction decoding.
///
/// Every variant is fatal to the current decode call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecodeError {
    /// Two legacy prefixes from the same group in one instruction.
    #[error("duplicate {group} prefix {byte:#04x} at offset {offset}")]
    DuplicatePrefixGroup {
        group: PrefixGroup,
        byte: u8,
        offset: usize,
    },

    /// REX and VEX (or VEX and an incompatible legacy prefix) in one instruction.
    #[error("conflicting prefix form at offset {offset}: {reason}")]
    ConflictingPrefixForm { offset: usize, reason: String },

    /// No attribute entry for the resolved (map, opcode) pair.
    #[error("unknown opcode {opcode:#04x} in {map} map at offset {offset}")]
    UnknownOpcode {
        map: OpcodeMap,
        opcode: u8,
        offset: usize,
    },

    /// Buffer exhausted before a required field could be read.
    #[error("truncated instruction: need {needed} bytes, have {available}")]
    TruncatedInstruction { needed: usize, available: usize },

    /// Cumulative size would exceed the architectural instruction length limit.
    #[error("instruction too long: {needed} bytes exceeds the 15 byte limit")]
    InstructionTooLong { needed: usize },

    /// The opcode requires SIB addressing but the ModR/M form has none.
    #[error("missing SIB byte for ModR/M at offset {offset}")]
    MissingSib { offset: usize },
}

impl DecodeError {
    /// Creates a new DuplicatePrefixGroup error.
    pub fn duplicate_prefix(group: PrefixGroup, byte: u8, offset: usize) -> Self {
        Self::DuplicatePrefixGroup { group, byte, offset }
    }

    /// Creates a new ConflictingPrefixForm error.
    pub fn conflicting_prefix(offset: usize, reason: impl Into<String>) -> Self {
        Self::ConflictingPrefixForm {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates a new UnknownOpcode error.
    pub fn unknown_opcode(map: OpcodeMap, opcode: u8, offset: usize) -> Self {
        Self::UnknownOpcode { map, opcode, offset }
    }

    /// Creates a new TruncatedInstruction error.
    pub fn truncated(needed: usize, available: usize) -> Self {
        Self::TruncatedInstruction { needed, available }
    }

    /// Creates a new InstructionTooLong error.
    pub fn too_long(needed: usize) -> Self {
        Self::InstructionTooLong { needed }
    }
}

/// Pipeline stage in which a decode stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stage {
    Start,
    Prefixes,
    RexVex,
    Opcode,
    ModRmSib,
    Trailing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Prefixes => "prefixes",
            Self::RexVex => "rex/vex",
            Self::Opcode => "opcode",
            Self::ModRmSib => "modrm/sib",
            Self::Trailing => "trailing fields",
        };
        f.write_str(name)
    }
}

/// Terminal `Invalid` state of a decode.
///
/// `consumed` is the number of bytes the pipeline accepted before the
/// failure, so a caller scanning a larger buffer can skip forward and
/// resynchronize.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("invalid instruction ({stage}, {consumed} bytes consumed)")]
pub struct InvalidInstruction {
    /// The rule violation that stopped the decode.
    #[source]
    pub error: DecodeError,
    /// Stage that reported the error.
    pub stage: Stage,
    /// Partial byte count consumed before the failure.
    pub consumed: usize,
}

impl InvalidInstruction {
    pub fn new(error: DecodeError, stage: Stage, consumed: usize) -> Self {
        Self {
            error,
            stage,
            consumed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = DecodeError::duplicate_prefix(PrefixGroup::LockRep, 0xF0, 1);
        assert_eq!(err.to_string(), "duplicate lock/rep prefix 0xf0 at offset 1");

        let err = DecodeError::unknown_opcode(OpcodeMap::TwoByte, 0x04, 1);
        assert_eq!(err.to_string(), "unknown opcode 0x04 in 0f map at offset 1");

        let err = DecodeError::truncated(3, 2);
        assert_eq!(err.to_string(), "truncated instruction: need 3 bytes, have 2");
    }

    #[test]
    fn test_invalid_instruction_source() {
        use std::error::Error;

        let invalid = InvalidInstruction::new(DecodeError::too_long(16), Stage::Trailing, 15);
        assert_eq!(
            invalid.to_string(),
            "invalid instruction (trailing fields, 15 bytes consumed)"
        );
        let source = invalid.source().map(|s| s.to_string());
        assert_eq!(
            source.as_deref(),
            Some("instruction too long: 16 bytes exceeds the 15 byte limit")
        );
    }
}
