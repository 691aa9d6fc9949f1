//! Per-opcode attribute bits.

use bitflags::bitflags;

bitflags! {
    /// Describes which fields follow an opcode byte.
    ///
    /// The immediate width modifiers add up when more than one is set
    /// (ENTER carries `IMM16 | IMM8`, a far pointer `IMM_Z | IMM16`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct AttributeBits: u32 {
        /// A ModR/M byte follows the opcode.
        const MODRM = 1 << 0;
        /// Memory forms must carry a SIB byte (VSIB addressing).
        const SIB = 1 << 1;
        /// An address-sized displacement (moffs) follows with no ModR/M.
        const DISPLACEMENT = 1 << 2;
        /// At least one immediate follows.
        const IMMEDIATE = 1 << 3;
        /// The byte redirects lookup to another opcode map.
        const ESCAPE = 1 << 4;
        /// The byte is a terminal opcode.
        const OPCODE = 1 << 5;
        /// Encodable in 64-bit mode.
        const REX = 1 << 6;
        /// Has a VEX-encoded form.
        const VEX = 1 << 7;

        /// 8-bit immediate or rel8.
        const IMM8 = 1 << 8;
        /// 16-bit immediate.
        const IMM16 = 1 << 9;
        /// 16 or 32-bit immediate, by operand size.
        const IMM_Z = 1 << 10;
        /// 16, 32 or 64-bit immediate, by operand size.
        const IMM_V = 1 << 11;
        /// Near branch offset: 16 or 32 bits, always 32 in 64-bit mode.
        const REL_Z = 1 << 12;
        /// The immediate is only present for ModR/M.reg 0 and 1 (TEST).
        const TEST_ONLY_IMM = 1 << 13;
        /// Only encodable with a VEX prefix.
        const VEX_ONLY = 1 << 14;
    }
}

impl AttributeBits {
    /// Mask of all immediate width modifiers.
    pub const IMMEDIATE_WIDTHS: Self = Self::IMM8
        .union(Self::IMM16)
        .union(Self::IMM_Z)
        .union(Self::IMM_V)
        .union(Self::REL_Z);

    pub fn has_modrm(self) -> bool {
        self.contains(Self::MODRM)
    }

    pub fn requires_sib(self) -> bool {
        self.contains(Self::SIB)
    }

    pub fn has_moffs(self) -> bool {
        self.contains(Self::DISPLACEMENT)
    }

    pub fn has_immediate(self) -> bool {
        self.contains(Self::IMMEDIATE)
    }

    pub fn is_escape(self) -> bool {
        self.contains(Self::ESCAPE)
    }

    pub fn is_opcode(self) -> bool {
        self.contains(Self::OPCODE)
    }

    pub fn allows_rex(self) -> bool {
        self.contains(Self::REX)
    }

    pub fn allows_vex(self) -> bool {
        self.contains(Self::VEX)
    }

    pub fn requires_vex(self) -> bool {
        self.contains(Self::VEX_ONLY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_width_mask() {
        let enter = AttributeBits::OPCODE | AttributeBits::IMMEDIATE | AttributeBits::IMM16 | AttributeBits::IMM8;
        assert!(enter.has_immediate());
        assert_eq!(
            enter & AttributeBits::IMMEDIATE_WIDTHS,
            AttributeBits::IMM16 | AttributeBits::IMM8
        );
        assert!(!enter.has_modrm());
    }
}
