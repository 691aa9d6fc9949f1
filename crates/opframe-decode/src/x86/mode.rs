//! Processor addressing modes and effective size rules.

use std::fmt;
use std::str::FromStr;

/// Addressing mode the byte stream is decoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Real mode / 16-bit protected mode.
    Mode16,
    /// 32-bit protected mode (and compatibility mode).
    Mode32,
    /// 64-bit long mode.
    Mode64,
}

impl Mode {
    /// Returns the mode width in bits.
    pub fn bits(self) -> u16 {
        match self {
            Self::Mode16 => 16,
            Self::Mode32 => 32,
            Self::Mode64 => 64,
        }
    }

    /// Returns the operand size in bits with no prefixes applied.
    pub fn default_operand_size(self) -> u16 {
        match self {
            Self::Mode16 => 16,
            Self::Mode32 | Self::Mode64 => 32,
        }
    }

    /// Returns the address size in bits with no prefixes applied.
    pub fn default_address_size(self) -> u16 {
        self.bits()
    }

    /// Returns the effective operand size in bits.
    ///
    /// REX.W takes precedence over the 0x66 override.
    pub fn effective_operand_size(self, operand_override: bool, rex_w: bool) -> u16 {
        if rex_w && self == Self::Mode64 {
            64
        } else if operand_override {
            match self.default_operand_size() {
                16 => 32,
                _ => 16,
            }
        } else {
            self.default_operand_size()
        }
    }

    /// Returns the effective address size in bits.
    pub fn effective_address_size(self, address_override: bool) -> u16 {
        match (self, address_override) {
            (Self::Mode16, false) => 16,
            (Self::Mode16, true) => 32,
            (Self::Mode32, false) => 32,
            (Self::Mode32, true) => 16,
            (Self::Mode64, false) => 64,
            (Self::Mode64, true) => 32,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "16" | "mode16" | "real" => Ok(Self::Mode16),
            "32" | "mode32" | "x86" | "i386" => Ok(Self::Mode32),
            "64" | "mode64" | "x86_64" | "x64" | "amd64" => Ok(Self::Mode64),
            other => Err(format!("unknown addressing mode '{}'", other)),
        }
    }
}

/// Operand and address sizes in effect for one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveSizes {
    pub mode: Mode,
    /// Operand size in bits (16, 32 or 64).
    pub operand: u16,
    /// Address size in bits (16, 32 or 64).
    pub address: u16,
}

impl EffectiveSizes {
    pub fn new(mode: Mode, operand_override: bool, address_override: bool, rex_w: bool) -> Self {
        Self {
            mode,
            operand: mode.effective_operand_size(operand_override, rex_w),
            address: mode.effective_address_size(address_override),
        }
    }
}
