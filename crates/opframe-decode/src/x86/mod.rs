//! x86 / x86-64 instruction framing.
//!
//! Decoding runs as a fixed sequence of stages over a shared cursor:
//!
//! 1. legacy prefixes (at most one per group, at most four)
//! 2. REX (64-bit mode only) or VEX
//! 3. opcode, through the 0F / 0F 38 / 0F 3A escape maps
//! 4. ModR/M and SIB
//! 5. displacement and immediate
//!
//! Each stage either consumes bytes and hands its result to the next, or
//! stops the decode with a [`DecodeError`](crate::DecodeError).

pub mod attributes;
pub mod cursor;
pub mod decoder;
pub mod fields;
pub mod instruction;
pub mod mode;
pub mod modrm;
pub mod opcode;
pub mod prefix;
pub mod rex_vex;
pub mod tables;

/// Architectural instruction length limit in bytes.
pub const MAX_INSTRUCTION_LEN: usize = 15;

pub use attributes::AttributeBits;
pub use cursor::ByteCursor;
pub use decoder::X86Decoder;
pub use fields::{FieldSpan, TrailingFields};
pub use instruction::{DecodedInstruction, FieldLengths};
pub use mode::{EffectiveSizes, Mode};
pub use modrm::{ModRm, Sib};
pub use opcode::OpcodeRef;
pub use prefix::{BranchHint, PrefixGroup, PrefixSet, PrefixSlot, Segment};
pub use rex_vex::{Rex, RexOrVex, Vex};
pub use tables::{OpcodeMap, OpcodeTables};
