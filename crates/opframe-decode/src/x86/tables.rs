//! Opcode attribute tables.
//!
//! Four maps, each indexed by the final opcode byte:
//! - primary (one-byte opcodes)
//! - 0F (two-byte opcodes)
//! - 0F 38 and 0F 3A (three-byte opcodes)
//!
//! The built-in contents follow the Intel SDM opcode maps (Volume 2,
//! Appendix A). An absent entry is an undefined opcode. Callers that load
//! their own tables start from [`OpcodeTables::empty`] or a clone of the
//! built-in set.

use std::fmt;

use super::attributes::AttributeBits;

/// Opcode map selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpcodeMap {
    /// One-byte opcodes.
    Primary,
    /// 0F xx
    TwoByte,
    /// 0F 38 xx
    ThreeByte38,
    /// 0F 3A xx
    ThreeByte3A,
}

impl OpcodeMap {
    pub const ALL: [OpcodeMap; 4] = [
        Self::Primary,
        Self::TwoByte,
        Self::ThreeByte38,
        Self::ThreeByte3A,
    ];

    fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::TwoByte => 1,
            Self::ThreeByte38 => 2,
            Self::ThreeByte3A => 3,
        }
    }

    /// Maps a VEX.mmmmm value to the opcode map it implies.
    pub fn from_vex_map(mmmmm: u8) -> Option<Self> {
        match mmmmm {
            1 => Some(Self::TwoByte),
            2 => Some(Self::ThreeByte38),
            3 => Some(Self::ThreeByte3A),
            _ => None,
        }
    }
}

impl fmt::Display for OpcodeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Primary => "primary",
            Self::TwoByte => "0f",
            Self::ThreeByte38 => "0f38",
            Self::ThreeByte3A => "0f3a",
        };
        f.write_str(name)
    }
}

/// First escape byte (two-byte opcodes).
pub const TWO_BYTE_ESCAPE: u8 = 0x0F;
/// Second escape byte selecting the 0F 38 map.
pub const THREE_BYTE_38_ESCAPE: u8 = 0x38;
/// Second escape byte selecting the 0F 3A map.
pub const THREE_BYTE_3A_ESCAPE: u8 = 0x3A;

type Map = [Option<AttributeBits>; 256];

/// Attribute lookup for all four opcode maps.
#[derive(Clone, PartialEq, Eq)]
pub struct OpcodeTables {
    maps: [Map; 4],
}

impl OpcodeTables {
    /// Tables with no defined opcodes.
    pub const fn empty() -> Self {
        Self {
            maps: [[None; 256]; 4],
        }
    }

    /// The built-in tables.
    pub fn builtin() -> &'static Self {
        &BUILTIN
    }

    /// Looks up the attributes of `opcode` in `map`.
    pub fn get(&self, map: OpcodeMap, opcode: u8) -> Option<AttributeBits> {
        self.maps[map.index()][opcode as usize]
    }

    /// Defines or replaces an entry.
    pub fn set(&mut self, map: OpcodeMap, opcode: u8, attrs: AttributeBits) {
        self.maps[map.index()][opcode as usize] = Some(attrs);
    }

    /// Removes an entry, making the opcode undefined.
    pub fn clear(&mut self, map: OpcodeMap, opcode: u8) {
        self.maps[map.index()][opcode as usize] = None;
    }

    /// Number of defined entries in `map`.
    pub fn defined(&self, map: OpcodeMap) -> usize {
        self.maps[map.index()].iter().filter(|e| e.is_some()).count()
    }
}

impl Default for OpcodeTables {
    fn default() -> Self {
        BUILTIN.clone()
    }
}

impl fmt::Debug for OpcodeTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("OpcodeTables");
        for map in OpcodeMap::ALL {
            s.field(&map.to_string(), &self.defined(map));
        }
        s.finish()
    }
}

// =============================================================================
// Built-in table contents
// =============================================================================

/// Terminal opcode valid in every mode.
const OP: AttributeBits = AttributeBits::OPCODE.union(AttributeBits::REX);
/// Terminal opcode that is not encodable in 64-bit mode.
const LEGACY: AttributeBits = AttributeBits::OPCODE;
/// Escape byte.
const ESC: AttributeBits = AttributeBits::ESCAPE.union(AttributeBits::REX);

const M: AttributeBits = AttributeBits::MODRM;
const V: AttributeBits = AttributeBits::VEX;
const VSIB: AttributeBits = AttributeBits::SIB;
const MOFFS: AttributeBits = AttributeBits::DISPLACEMENT;
const IB: AttributeBits = AttributeBits::IMMEDIATE.union(AttributeBits::IMM8);
const IW: AttributeBits = AttributeBits::IMMEDIATE.union(AttributeBits::IMM16);
const IZ: AttributeBits = AttributeBits::IMMEDIATE.union(AttributeBits::IMM_Z);
const IV: AttributeBits = AttributeBits::IMMEDIATE.union(AttributeBits::IMM_V);
const JZ: AttributeBits = AttributeBits::IMMEDIATE.union(AttributeBits::REL_Z);
const TEST: AttributeBits = AttributeBits::TEST_ONLY_IMM;
const VEX_ONLY: AttributeBits = AttributeBits::VEX_ONLY;

const fn fill(mut table: Map, first: usize, last: usize, attrs: AttributeBits) -> Map {
    let mut i = first;
    while i <= last {
        table[i] = Some(attrs);
        i += 1;
    }
    table
}

const fn set(mut table: Map, opcode: usize, attrs: AttributeBits) -> Map {
    table[opcode] = Some(attrs);
    table
}

/// One-byte opcode map. Legacy prefix bytes have no entry.
const PRIMARY: Map = {
    let mut t: Map = [None; 256];

    // ADD, OR, ADC, SBB, AND, SUB, XOR, CMP: r/m forms, AL,ib and eAX,iz
    let mut row = 0x00;
    while row < 0x40 {
        t = fill(t, row, row + 3, OP.union(M));
        t = set(t, row + 4, OP.union(IB));
        t = set(t, row + 5, OP.union(IZ));
        row += 8;
    }

    // PUSH/POP ES, CS, SS, DS
    t = set(t, 0x06, LEGACY);
    t = set(t, 0x07, LEGACY);
    t = set(t, 0x0E, LEGACY);
    t = set(t, TWO_BYTE_ESCAPE as usize, ESC);
    t = set(t, 0x16, LEGACY);
    t = set(t, 0x17, LEGACY);
    t = set(t, 0x1E, LEGACY);
    t = set(t, 0x1F, LEGACY);

    // DAA, DAS, AAA, AAS
    t = set(t, 0x27, LEGACY);
    t = set(t, 0x2F, LEGACY);
    t = set(t, 0x37, LEGACY);
    t = set(t, 0x3F, LEGACY);

    // INC/DEC r16/32 (REX in 64-bit mode)
    t = fill(t, 0x40, 0x4F, LEGACY);
    // PUSH/POP r
    t = fill(t, 0x50, 0x5F, OP);

    // PUSHA, POPA, BOUND
    t = set(t, 0x60, LEGACY);
    t = set(t, 0x61, LEGACY);
    t = set(t, 0x62, LEGACY.union(M));
    // ARPL / MOVSXD
    t = set(t, 0x63, OP.union(M));
    t = set(t, 0x68, OP.union(IZ));
    t = set(t, 0x69, OP.union(M).union(IZ));
    t = set(t, 0x6A, OP.union(IB));
    t = set(t, 0x6B, OP.union(M).union(IB));
    // INS/OUTS
    t = fill(t, 0x6C, 0x6F, OP);

    // Jcc rel8
    t = fill(t, 0x70, 0x7F, OP.union(IB));

    // Group 1
    t = set(t, 0x80, OP.union(M).union(IB));
    t = set(t, 0x81, OP.union(M).union(IZ));
    t = set(t, 0x82, LEGACY.union(M).union(IB));
    t = set(t, 0x83, OP.union(M).union(IB));
    // TEST, XCHG, MOV, MOV Sreg, LEA, POP r/m
    t = fill(t, 0x84, 0x8F, OP.union(M));

    // NOP/XCHG, CBW, CWD, WAIT, PUSHF, POPF, SAHF, LAHF
    t = fill(t, 0x90, 0x9F, OP);
    // CALL far ptr16:16/32
    t = set(t, 0x9A, LEGACY.union(IZ).union(IW));

    // MOV AL/eAX <-> moffs
    t = fill(t, 0xA0, 0xA3, OP.union(MOFFS));
    t = fill(t, 0xA4, 0xA7, OP);
    t = set(t, 0xA8, OP.union(IB));
    t = set(t, 0xA9, OP.union(IZ));
    t = fill(t, 0xAA, 0xAF, OP);

    // MOV r8, ib / MOV r, iv
    t = fill(t, 0xB0, 0xB7, OP.union(IB));
    t = fill(t, 0xB8, 0xBF, OP.union(IV));

    // Group 2 shifts by ib, RET iw, RET
    t = set(t, 0xC0, OP.union(M).union(IB));
    t = set(t, 0xC1, OP.union(M).union(IB));
    t = set(t, 0xC2, OP.union(IW));
    t = set(t, 0xC3, OP);
    // LES, LDS (VEX lead bytes are claimed before lookup)
    t = set(t, 0xC4, LEGACY.union(M));
    t = set(t, 0xC5, LEGACY.union(M));
    // MOV r/m, imm (and XABORT/XBEGIN)
    t = set(t, 0xC6, OP.union(M).union(IB));
    t = set(t, 0xC7, OP.union(M).union(IZ));
    // ENTER iw, ib
    t = set(t, 0xC8, OP.union(IW).union(IB));
    t = set(t, 0xC9, OP);
    t = set(t, 0xCA, OP.union(IW));
    t = set(t, 0xCB, OP);
    t = set(t, 0xCC, OP);
    t = set(t, 0xCD, OP.union(IB));
    t = set(t, 0xCE, LEGACY);
    t = set(t, 0xCF, OP);

    // Group 2 shifts by 1 / CL
    t = fill(t, 0xD0, 0xD3, OP.union(M));
    // AAM, AAD
    t = set(t, 0xD4, LEGACY.union(IB));
    t = set(t, 0xD5, LEGACY.union(IB));
    t = set(t, 0xD7, OP);
    // x87 escapes
    t = fill(t, 0xD8, 0xDF, OP.union(M));

    // LOOPcc, JCXZ, IN/OUT ib
    t = fill(t, 0xE0, 0xE7, OP.union(IB));
    // CALL/JMP rel
    t = set(t, 0xE8, OP.union(JZ));
    t = set(t, 0xE9, OP.union(JZ));
    t = set(t, 0xEA, LEGACY.union(IZ).union(IW));
    t = set(t, 0xEB, OP.union(IB));
    t = fill(t, 0xEC, 0xEF, OP);

    t = set(t, 0xF1, OP);
    t = set(t, 0xF4, OP);
    t = set(t, 0xF5, OP);
    // Group 3: only TEST (/0, /1) carries an immediate
    t = set(t, 0xF6, OP.union(M).union(IB).union(TEST));
    t = set(t, 0xF7, OP.union(M).union(IZ).union(TEST));
    t = fill(t, 0xF8, 0xFD, OP);
    // Group 4 and 5
    t = set(t, 0xFE, OP.union(M));
    t = set(t, 0xFF, OP.union(M));

    t
};

/// Two-byte opcode map (0F xx).
const TWO_BYTE: Map = {
    let mut t: Map = [None; 256];

    // Group 6, group 7, LAR, LSL
    t = fill(t, 0x00, 0x03, OP.union(M));
    // SYSCALL, CLTS, SYSRET, INVD, WBINVD
    t = fill(t, 0x05, 0x09, OP);
    // UD2
    t = set(t, 0x0B, OP);
    // PREFETCHW group
    t = set(t, 0x0D, OP.union(M));
    // FEMMS
    t = set(t, 0x0E, OP);
    // 3DNow! (suffix opcode in the immediate position)
    t = set(t, 0x0F, OP.union(M).union(IB));

    // MOVUPS .. MOVHPS
    t = fill(t, 0x10, 0x17, OP.union(M).union(V));
    // Prefetch hints, hint NOPs, ENDBR
    t = fill(t, 0x18, 0x1F, OP.union(M));

    // MOV to/from CR/DR
    t = fill(t, 0x20, 0x23, OP.union(M));
    // MOVAPS .. COMISS
    t = fill(t, 0x28, 0x2F, OP.union(M).union(V));

    // WRMSR, RDTSC, RDMSR, RDPMC, SYSENTER, SYSEXIT, GETSEC
    t = fill(t, 0x30, 0x35, OP);
    t = set(t, 0x37, OP);
    t = set(t, THREE_BYTE_38_ESCAPE as usize, ESC);
    t = set(t, THREE_BYTE_3A_ESCAPE as usize, ESC);

    // CMOVcc; opmask logic ops share the map under VEX
    t = fill(t, 0x40, 0x4F, OP.union(M));
    t = set(t, 0x41, OP.union(M).union(V));
    t = set(t, 0x42, OP.union(M).union(V));
    t = fill(t, 0x44, 0x47, OP.union(M).union(V));
    t = set(t, 0x4A, OP.union(M).union(V));
    t = set(t, 0x4B, OP.union(M).union(V));

    // SSE/SSE2 and MMX arithmetic
    t = fill(t, 0x50, 0x6F, OP.union(M).union(V));
    // PSHUF*, shift groups 12-14 with ib
    t = fill(t, 0x70, 0x73, OP.union(M).union(IB).union(V));
    t = fill(t, 0x74, 0x76, OP.union(M).union(V));
    // EMMS / VZEROUPPER / VZEROALL
    t = set(t, 0x77, OP.union(V));
    // VMREAD, VMWRITE
    t = set(t, 0x78, OP.union(M));
    t = set(t, 0x79, OP.union(M));
    t = fill(t, 0x7C, 0x7F, OP.union(M).union(V));

    // Jcc rel16/32
    t = fill(t, 0x80, 0x8F, OP.union(JZ));

    // SETcc; opmask moves under VEX
    t = fill(t, 0x90, 0x9F, OP.union(M));
    t = fill(t, 0x90, 0x93, OP.union(M).union(V));
    t = set(t, 0x98, OP.union(M).union(V));
    t = set(t, 0x99, OP.union(M).union(V));

    // PUSH/POP FS, CPUID, BT, SHLD
    t = fill(t, 0xA0, 0xA2, OP);
    t = set(t, 0xA3, OP.union(M));
    t = set(t, 0xA4, OP.union(M).union(IB));
    t = set(t, 0xA5, OP.union(M));
    // PUSH/POP GS, RSM, BTS, SHRD
    t = fill(t, 0xA8, 0xAA, OP);
    t = set(t, 0xAB, OP.union(M));
    t = set(t, 0xAC, OP.union(M).union(IB));
    t = set(t, 0xAD, OP.union(M));
    // Group 15 (fences, LDMXCSR/STMXCSR)
    t = set(t, 0xAE, OP.union(M).union(V));
    t = set(t, 0xAF, OP.union(M));

    // CMPXCHG, LSS, BTR, LFS, LGS, MOVZX, POPCNT, UD1
    t = fill(t, 0xB0, 0xB9, OP.union(M));
    // Group 8 (BT* ib)
    t = set(t, 0xBA, OP.union(M).union(IB));
    // BTC, BSF, BSR, MOVSX
    t = fill(t, 0xBB, 0xBF, OP.union(M));

    // XADD
    t = set(t, 0xC0, OP.union(M));
    t = set(t, 0xC1, OP.union(M));
    t = set(t, 0xC2, OP.union(M).union(IB).union(V));
    t = set(t, 0xC3, OP.union(M));
    // PINSRW, PEXTRW, SHUFPS
    t = fill(t, 0xC4, 0xC6, OP.union(M).union(IB).union(V));
    // Group 9 (CMPXCHG8B/16B, RDRAND, RDSEED)
    t = set(t, 0xC7, OP.union(M));
    // BSWAP
    t = fill(t, 0xC8, 0xCF, OP);

    // MMX/SSE2 arithmetic
    t = fill(t, 0xD0, 0xFE, OP.union(M).union(V));
    // UD0
    t = set(t, 0xFF, OP.union(M));

    t
};

/// Three-byte opcode map (0F 38 xx). Every entry takes a ModR/M byte.
const THREE_BYTE_38: Map = {
    const MV: AttributeBits = OP.union(M).union(V);
    const ML: AttributeBits = OP.union(M);
    const VO: AttributeBits = MV.union(VEX_ONLY);

    let mut t: Map = [None; 256];

    // SSSE3 (PSHUFB .. PMULHRSW)
    t = fill(t, 0x00, 0x0B, MV);
    // VPERMILPS/PD, VTESTPS/PD
    t = fill(t, 0x0C, 0x0F, VO);
    // PBLENDVB, BLENDVPS/PD (legacy only), VCVTPH2PS, VPERMPS, PTEST
    t = set(t, 0x10, ML);
    t = set(t, 0x13, VO);
    t = set(t, 0x14, ML);
    t = set(t, 0x15, ML);
    t = set(t, 0x16, VO);
    t = set(t, 0x17, MV);
    // VBROADCASTSS/SD/F128
    t = fill(t, 0x18, 0x1A, VO);
    // PABSB/W/D
    t = fill(t, 0x1C, 0x1E, MV);
    // PMOVSX*
    t = fill(t, 0x20, 0x25, MV);
    // PMULDQ, PCMPEQQ, MOVNTDQA, PACKUSDW
    t = fill(t, 0x28, 0x2B, MV);
    // VMASKMOVPS/PD
    t = fill(t, 0x2C, 0x2F, VO);
    // PMOVZX*, VPERMD, PCMPGTQ, PMIN*/PMAX*, PMULLD, PHMINPOSUW
    t = fill(t, 0x30, 0x41, MV);
    t = set(t, 0x36, VO);
    // VPSRLV, VPSRAVD, VPSLLV
    t = fill(t, 0x45, 0x47, VO);
    // VPBROADCASTD/Q/I128
    t = fill(t, 0x58, 0x5A, VO);
    // VPBROADCASTB/W
    t = set(t, 0x78, VO);
    t = set(t, 0x79, VO);
    // INVEPT, INVVPID, INVPCID
    t = fill(t, 0x80, 0x82, ML);
    // VPMASKMOVD/Q
    t = set(t, 0x8C, VO);
    t = set(t, 0x8E, VO);
    // Gathers use VSIB addressing
    t = fill(t, 0x90, 0x93, VO.union(VSIB));
    // FMA3
    t = fill(t, 0x96, 0x9F, VO);
    t = fill(t, 0xA6, 0xAF, VO);
    t = fill(t, 0xB6, 0xBF, VO);
    // SHA
    t = fill(t, 0xC8, 0xCD, ML);
    // GF2P8MULB
    t = set(t, 0xCF, MV);
    // AESIMC, AESENC, AESENCLAST, AESDEC, AESDECLAST
    t = fill(t, 0xDB, 0xDF, MV);
    // MOVBE / CRC32
    t = set(t, 0xF0, ML);
    t = set(t, 0xF1, ML);
    // ANDN, group 17 (BLSR/BLSMSK/BLSI), BZHI/PEXT/PDEP, ADCX/ADOX/MULX, BEXTR/SHLX/SARX/SHRX
    t = set(t, 0xF2, VO);
    t = set(t, 0xF3, VO);
    t = set(t, 0xF5, VO);
    t = set(t, 0xF6, MV);
    t = set(t, 0xF7, VO);
    // MOVDIR64B, MOVDIRI
    t = set(t, 0xF8, ML);
    t = set(t, 0xF9, ML);

    t
};

/// Three-byte opcode map (0F 3A xx). Every entry takes ModR/M and an 8-bit immediate.
const THREE_BYTE_3A: Map = {
    const MIV: AttributeBits = OP.union(M).union(IB).union(V);
    const MIL: AttributeBits = OP.union(M).union(IB);
    const VO: AttributeBits = MIV.union(VEX_ONLY);

    let mut t: Map = [None; 256];

    // VPERMQ, VPERMPD, VPBLENDD
    t = fill(t, 0x00, 0x02, VO);
    // VPERMILPS/PD, VPERM2F128
    t = fill(t, 0x04, 0x06, VO);
    // ROUND*, BLEND*, PALIGNR
    t = fill(t, 0x08, 0x0F, MIV);
    // PEXTRB/W/D, EXTRACTPS
    t = fill(t, 0x14, 0x17, MIV);
    // VINSERTF128, VEXTRACTF128, VCVTPS2PH
    t = set(t, 0x18, VO);
    t = set(t, 0x19, VO);
    t = set(t, 0x1D, VO);
    // PINSRB, INSERTPS, PINSRD/Q
    t = fill(t, 0x20, 0x22, MIV);
    // VINSERTI128, VEXTRACTI128
    t = set(t, 0x38, VO);
    t = set(t, 0x39, VO);
    // DPPS, DPPD, MPSADBW, PCLMULQDQ, VPERM2I128
    t = fill(t, 0x40, 0x42, MIV);
    t = set(t, 0x44, MIV);
    t = set(t, 0x46, VO);
    // VBLENDVPS/PD, VPBLENDVB
    t = fill(t, 0x4A, 0x4C, VO);
    // PCMPESTRM/I, PCMPISTRM/I
    t = fill(t, 0x60, 0x63, MIV);
    // SHA1RNDS4
    t = set(t, 0xCC, MIL);
    // GF2P8AFFINEQB, GF2P8AFFINEINVQB
    t = set(t, 0xCE, MIV);
    t = set(t, 0xCF, MIV);
    // AESKEYGENASSIST
    t = set(t, 0xDF, MIV);
    // RORX
    t = set(t, 0xF0, VO);

    t
};

static BUILTIN: OpcodeTables = OpcodeTables {
    maps: [PRIMARY, TWO_BYTE, THREE_BYTE_38, THREE_BYTE_3A],
};
