//! x86 instruction framing decoder.

use tracing::trace;

use super::cursor::ByteCursor;
use super::fields::size_trailing_fields;
use super::instruction::DecodedInstruction;
use super::mode::{EffectiveSizes, Mode};
use super::modrm::decode_modrm_sib;
use super::opcode::resolve_opcode;
use super::prefix::scan_prefixes;
use super::rex_vex::detect_rex_vex;
use super::tables::OpcodeTables;
use crate::error::{DecodeError, InvalidInstruction, Stage};
use crate::traits::InstructionDecoder;

/// x86 instruction decoder for one addressing mode.
///
/// Holds no mutable state; a single decoder can be shared across threads.
#[derive(Debug, Clone, Copy)]
pub struct X86Decoder<'t> {
    mode: Mode,
    tables: &'t OpcodeTables,
}

impl X86Decoder<'static> {
    /// Creates a decoder using the built-in opcode tables.
    pub fn new(mode: Mode) -> Self {
        Self::with_tables(mode, OpcodeTables::builtin())
    }
}

impl<'t> X86Decoder<'t> {
    /// Creates a decoder using caller-supplied opcode tables.
    pub fn with_tables(mode: Mode, tables: &'t OpcodeTables) -> Self {
        Self { mode, tables }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Decodes the instruction at the start of `bytes`.
    ///
    /// On failure the returned [`InvalidInstruction`] reports how many bytes
    /// the pipeline consumed before the rule violation.
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedInstruction, InvalidInstruction> {
        let mut cursor = ByteCursor::new(bytes);
        self.run(&mut cursor).map_err(|(stage, error)| {
            let invalid = InvalidInstruction::new(error, stage, cursor.position());
            trace!(
                mode = %self.mode,
                %stage,
                consumed = invalid.consumed,
                error = %invalid.error,
                "decode rejected"
            );
            invalid
        })
    }

    /// Runs the stages in order: prefixes, REX/VEX, opcode, ModR/M+SIB,
    /// displacement and immediate.
    fn run(&self, cursor: &mut ByteCursor<'_>) -> Result<DecodedInstruction, (Stage, DecodeError)> {
        if cursor.buffer().is_empty() {
            return Err((Stage::Start, DecodeError::truncated(1, 0)));
        }

        let prefixes = scan_prefixes(cursor, self.mode).map_err(at(Stage::Prefixes))?;
        let rex_vex = detect_rex_vex(cursor, self.mode, &prefixes).map_err(at(Stage::RexVex))?;
        let opcode = resolve_opcode(cursor, self.tables, self.mode, &rex_vex).map_err(at(Stage::Opcode))?;

        let sizes = EffectiveSizes::new(
            self.mode,
            prefixes.operand_size_override(),
            prefixes.address_size_override(),
            rex_vex.rex_w(),
        );

        let (modrm, sib) =
            decode_modrm_sib(cursor, opcode.attrs, sizes.address).map_err(at(Stage::ModRmSib))?;
        let trailing = size_trailing_fields(cursor, opcode.attrs, modrm.as_ref(), sib.as_ref(), sizes)
            .map_err(at(Stage::Trailing))?;

        Ok(DecodedInstruction {
            mode: self.mode,
            bytes: cursor.buffer()[..cursor.position()].to_vec(),
            prefixes,
            rex_vex,
            opcode,
            modrm,
            sib,
            displacement: trailing.displacement,
            immediate: trailing.immediate,
            operand_size: sizes.operand,
            address_size: sizes.address,
        })
    }
}

fn at(stage: Stage) -> impl Fn(DecodeError) -> (Stage, DecodeError) {
    move |error| (stage, error)
}

impl InstructionDecoder for X86Decoder<'_> {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedInstruction, InvalidInstruction> {
        X86Decoder::decode(self, bytes)
    }

    fn mode(&self) -> Mode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x86::prefix::PrefixGroup;
    use crate::x86::tables::OpcodeMap;
    use crate::x86::FieldSpan;

    fn decode32(bytes: &[u8]) -> Result<DecodedInstruction, InvalidInstruction> {
        X86Decoder::new(Mode::Mode32).decode(bytes)
    }

    fn decode64(bytes: &[u8]) -> Result<DecodedInstruction, InvalidInstruction> {
        X86Decoder::new(Mode::Mode64).decode(bytes)
    }

    #[test]
    fn test_nop() {
        let inst = decode32(&[0x90]).unwrap();
        assert_eq!(inst.size(), 1);
        assert!(inst.prefixes().is_empty());
        assert!(inst.modrm().is_none());
        assert_eq!(inst.opcode().map, OpcodeMap::Primary);
    }

    #[test]
    fn test_two_byte_nop() {
        let inst = decode32(&[0x0F, 0x1F, 0x00]).unwrap();
        assert_eq!(inst.size(), 3);
        assert_eq!(inst.opcode().map, OpcodeMap::TwoByte);
        assert!(inst.modrm().is_some());
        assert!(inst.sib().is_none());
        assert!(inst.displacement().is_none());
        assert_eq!(inst.opcode_bytes(), &[0x0F, 0x1F]);
    }

    #[test]
    fn test_endbr64() {
        let inst = decode64(&[0xF3, 0x48, 0x0F, 0x1E, 0xFA]).unwrap();
        assert_eq!(inst.size(), 5);
        assert_eq!(inst.prefixes().len(), 1);
        assert!(inst.prefixes().get(PrefixGroup::LockRep).is_some());
        assert!(inst.prefixes().rep());
        let rex = inst.rex_vex().rex().unwrap();
        assert!(rex.w);
        assert_eq!(inst.rex_vex_bytes(), &[0x48]);
        assert_eq!(inst.operand_size(), 64);
    }

    #[test]
    fn test_repeated_lock() {
        let err = decode32(&[0xF0, 0xF0, 0x90]).unwrap_err();
        assert!(matches!(err.error, DecodeError::DuplicatePrefixGroup { .. }));
        assert_eq!(err.stage, Stage::Prefixes);
        assert_eq!(err.consumed, 1);
    }

    #[test]
    fn test_empty_input() {
        let err = decode64(&[]).unwrap_err();
        assert_eq!(err.stage, Stage::Start);
        assert_eq!(err.consumed, 0);
        assert_eq!(err.error, DecodeError::truncated(1, 0));
    }

    #[test]
    fn test_mov_rbp_rsp() {
        // mov rbp, rsp (48 89 e5)
        let inst = decode64(&[0x48, 0x89, 0xE5]).unwrap();
        assert_eq!(inst.size(), 3);
        assert!(inst.modrm().unwrap().is_register());
    }

    #[test]
    fn test_inc_outside_long_mode() {
        let inst = decode32(&[0x40]).unwrap();
        assert_eq!(inst.size(), 1);
        assert!(inst.rex_vex().is_none());
        assert_eq!(inst.opcode().opcode, 0x40);

        let inst = X86Decoder::new(Mode::Mode16).decode(&[0x48]).unwrap();
        assert!(inst.rex_vex().is_none());
    }

    #[test]
    fn test_rex_without_opcode() {
        let err = decode64(&[0x48]).unwrap_err();
        assert_eq!(err.stage, Stage::Opcode);
        assert_eq!(err.error, DecodeError::truncated(2, 1));
        assert_eq!(err.consumed, 1);
    }

    #[test]
    fn test_double_rex_rejected() {
        let err = decode64(&[0x48, 0x48, 0x89, 0xE5]).unwrap_err();
        assert_eq!(err.stage, Stage::Opcode);
        assert!(matches!(err.error, DecodeError::UnknownOpcode { opcode: 0x48, .. }));
    }

    #[test]
    fn test_sib_and_disp8() {
        // mov eax, [esp+0x10]: 8b 44 24 10
        let inst = decode32(&[0x8B, 0x44, 0x24, 0x10]).unwrap();
        assert_eq!(inst.size(), 4);
        assert_eq!(inst.sib().unwrap().base, 0b100);
        assert_eq!(inst.displacement(), Some(FieldSpan { offset: 3, len: 1 }));
        assert_eq!(inst.displacement_bytes(), Some(&[0x10][..]));
    }

    #[test]
    fn test_rip_relative() {
        // lea rax, [rip+0x1000]: 48 8d 05 00 10 00 00
        let inst = decode64(&[0x48, 0x8D, 0x05, 0x00, 0x10, 0x00, 0x00]).unwrap();
        assert_eq!(inst.size(), 7);
        assert_eq!(inst.displacement().unwrap().len, 4);
        assert!(inst.sib().is_none());
    }

    #[test]
    fn test_sixteen_bit_addressing() {
        // mov ax, [0x1234] with ModR/M: 8b 06 34 12
        let inst = X86Decoder::new(Mode::Mode16).decode(&[0x8B, 0x06, 0x34, 0x12]).unwrap();
        assert_eq!(inst.size(), 4);
        assert_eq!(inst.address_size(), 16);
        assert_eq!(inst.displacement().unwrap().len, 2);

        // 67 switches a 32-bit decoder to 16-bit addressing: no SIB for rm=100
        let inst = decode32(&[0x67, 0x8B, 0x04]).unwrap();
        assert_eq!(inst.size(), 3);
        assert!(inst.sib().is_none());
    }

    #[test]
    fn test_immediates_follow_operand_size() {
        // mov eax, imm32
        assert_eq!(decode32(&[0xB8, 0x01, 0x00, 0x00, 0x00]).unwrap().size(), 5);
        // mov ax, imm16
        assert_eq!(decode32(&[0x66, 0xB8, 0x01, 0x00]).unwrap().size(), 4);
        // mov rax, imm64
        let movabs = [0x48, 0xB8, 1, 2, 3, 4, 5, 6, 7, 8];
        let inst = decode64(&movabs).unwrap();
        assert_eq!(inst.size(), 10);
        assert_eq!(inst.immediate_bytes(), Some(&movabs[2..]));
        // add rax, imm32 stays 32 bits under REX.W
        assert_eq!(decode64(&[0x48, 0x05, 0x01, 0x00, 0x00, 0x00]).unwrap().size(), 6);
    }

    #[test]
    fn test_moffs() {
        // mov eax, [moffs64]
        let inst = decode64(&[0xA1, 1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(inst.size(), 9);
        assert!(inst.modrm().is_none());
        // 67 shrinks the offset to 32 bits
        assert_eq!(decode64(&[0x67, 0xA1, 1, 2, 3, 4]).unwrap().size(), 6);
        assert_eq!(decode32(&[0xA1, 1, 2, 3, 4]).unwrap().size(), 5);
    }

    #[test]
    fn test_branches() {
        // call rel32
        assert_eq!(decode64(&[0xE8, 0x00, 0x01, 0x00, 0x00]).unwrap().size(), 5);
        // jne rel8
        assert_eq!(decode64(&[0x75, 0x10]).unwrap().size(), 2);
        // jz rel32 via 0F 84
        assert_eq!(decode64(&[0x0F, 0x84, 0, 0, 0, 0]).unwrap().size(), 6);
        // 66 does not shrink near branches in 64-bit mode
        assert_eq!(decode64(&[0x66, 0xE9, 0, 0, 0, 0]).unwrap().size(), 6);
        assert_eq!(decode32(&[0x66, 0xE9, 0, 0]).unwrap().size(), 4);
    }

    #[test]
    fn test_group3() {
        // test dword [eax], imm32
        assert_eq!(decode32(&[0xF7, 0x00, 1, 0, 0, 0]).unwrap().size(), 6);
        // not eax
        assert_eq!(decode32(&[0xF7, 0xD0]).unwrap().size(), 2);
    }

    #[test]
    fn test_vex_instruction() {
        // vaddps ymm0, ymm1, ymm2
        let inst = decode64(&[0xC5, 0xF4, 0x58, 0xC2]).unwrap();
        assert_eq!(inst.size(), 4);
        assert_eq!(inst.opcode().map, OpcodeMap::TwoByte);
        assert_eq!(inst.opcode_bytes(), &[0x58]);
        assert_eq!(inst.rex_vex_bytes(), &[0xC5, 0xF4]);

        // vpermq ymm0, ymm1, 0x1b
        let inst = decode64(&[0xC4, 0xE3, 0xFD, 0x00, 0xC1, 0x1B]).unwrap();
        assert_eq!(inst.size(), 6);
        assert_eq!(inst.opcode().map, OpcodeMap::ThreeByte3A);
        assert_eq!(inst.immediate().unwrap().len, 1);
    }

    #[test]
    fn test_vex_gather_requires_sib() {
        // vpgatherdd xmm0, [rax+xmm1*4], xmm2: c4 e2 69 90 04 88
        let inst = decode64(&[0xC4, 0xE2, 0x69, 0x90, 0x04, 0x88]).unwrap();
        assert_eq!(inst.size(), 6);
        assert!(inst.sib().is_some());

        let err = decode64(&[0xC4, 0xE2, 0x69, 0x90, 0xC0]).unwrap_err();
        assert_eq!(err.stage, Stage::ModRmSib);
        assert_eq!(err.error, DecodeError::MissingSib { offset: 4 });
    }

    #[test]
    fn test_lds_outside_long_mode() {
        // lds eax, [ebx]
        let inst = decode32(&[0xC5, 0x03]).unwrap();
        assert_eq!(inst.size(), 2);
        assert!(inst.rex_vex().is_none());
        assert!(inst.modrm().is_some());
    }

    #[test]
    fn test_instruction_too_long() {
        // Four prefixes, REX.W, add [rsp+disp32], imm32: 16 bytes
        let bytes = [
            0x2E, 0x66, 0x67, 0xF0, 0x48, 0x81, 0x84, 0x24, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        ];
        let err = decode64(&bytes).unwrap_err();
        assert_eq!(err.stage, Stage::Trailing);
        assert_eq!(err.error, DecodeError::too_long(16));
        assert_eq!(err.consumed, 12);
    }

    #[test]
    fn test_fifteen_byte_instruction() {
        // Four prefixes, REX, 0F 3A 0F (palignr) with SIB, disp32 and imm8
        let bytes = [
            0x2E, 0x66, 0x67, 0xF2, 0x48, 0x0F, 0x3A, 0x0F, 0x84, 0x24, 0x00, 0x00, 0x00, 0x00, 0x04, 0x90,
        ];
        let inst = decode64(&bytes).unwrap();
        assert_eq!(inst.size(), 15);
        assert_eq!(inst.field_lengths().total(), 15);
    }

    #[test]
    fn test_custom_tables() {
        let mut tables = OpcodeTables::builtin().clone();
        tables.clear(OpcodeMap::Primary, 0x90);
        let decoder = X86Decoder::with_tables(Mode::Mode32, &tables);
        let err = decoder.decode(&[0x90]).unwrap_err();
        assert_eq!(err.error, DecodeError::unknown_opcode(OpcodeMap::Primary, 0x90, 0));
        assert_eq!(err.consumed, 1);
        assert!(decoder.decode(&[0x91]).is_ok());
    }
}
