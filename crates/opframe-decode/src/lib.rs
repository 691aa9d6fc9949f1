//! # opframe-decode
//!
//! Instruction framing for x86 and x86-64.
//!
//! Given a byte buffer and an addressing mode, the decoder determines
//! whether the bytes begin a well-formed instruction and, if so, how long
//! it is and where each structural field sits:
//! - legacy prefixes
//! - REX or VEX
//! - opcode (primary, 0F, 0F 38 or 0F 3A map)
//! - ModR/M and SIB
//! - displacement and immediate
//!
//! It does not assign mnemonics or operands.
//!
//! ```
//! use opframe_decode::{Mode, X86Decoder};
//!
//! let decoder = X86Decoder::new(Mode::Mode64);
//! let endbr64 = decoder.decode(&[0xF3, 0x48, 0x0F, 0x1E, 0xFA]).unwrap();
//! assert_eq!(endbr64.size(), 5);
//! ```

pub mod error;
pub mod traits;
pub mod x86;

pub use error::{DecodeError, InvalidInstruction, Stage};
pub use traits::{BlockEntry, InstructionDecoder};
pub use x86::{
    AttributeBits, DecodedInstruction, FieldLengths, FieldSpan, Mode, OpcodeMap, OpcodeTables,
    X86Decoder, MAX_INSTRUCTION_LEN,
};
