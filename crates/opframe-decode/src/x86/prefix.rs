//! Legacy prefix scanning.

use std::fmt;

use tracing::trace;

use super::cursor::ByteCursor;
use super::mode::Mode;
use crate::error::DecodeError;

/// Most legacy prefixes one instruction can carry (one per group).
pub const MAX_PREFIXES: usize = 4;

pub const LOCK: u8 = 0xF0;
pub const REPNE: u8 = 0xF2;
pub const REP: u8 = 0xF3;
pub const OPERAND_SIZE_OVERRIDE: u8 = 0x66;
pub const ADDRESS_SIZE_OVERRIDE: u8 = 0x67;

/// The four mutually exclusive legacy prefix groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PrefixGroup {
    /// Group 1: LOCK (F0), REPNE (F2), REP (F3)
    LockRep,
    /// Group 2: segment overrides and branch hints
    SegmentOrHint,
    /// Group 3: operand-size override (66)
    OperandSize,
    /// Group 4: address-size override (67)
    AddressSize,
}

impl PrefixGroup {
    /// Classifies a byte, returning `None` if it is not a legacy prefix.
    pub fn classify(byte: u8) -> Option<Self> {
        match byte {
            LOCK | REPNE | REP => Some(Self::LockRep),
            0x26 | 0x2E | 0x36 | 0x3E | 0x64 | 0x65 => Some(Self::SegmentOrHint),
            OPERAND_SIZE_OVERRIDE => Some(Self::OperandSize),
            ADDRESS_SIZE_OVERRIDE => Some(Self::AddressSize),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::LockRep => 0,
            Self::SegmentOrHint => 1,
            Self::OperandSize => 2,
            Self::AddressSize => 3,
        }
    }
}

impl fmt::Display for PrefixGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LockRep => "lock/rep",
            Self::SegmentOrHint => "segment/branch-hint",
            Self::OperandSize => "operand-size",
            Self::AddressSize => "address-size",
        };
        f.write_str(name)
    }
}

/// Segment override prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Segment {
    CS,
    SS,
    DS,
    ES,
    FS,
    GS,
}

impl Segment {
    pub fn from_prefix(byte: u8) -> Option<Self> {
        match byte {
            0x2E => Some(Self::CS),
            0x36 => Some(Self::SS),
            0x3E => Some(Self::DS),
            0x26 => Some(Self::ES),
            0x64 => Some(Self::FS),
            0x65 => Some(Self::GS),
            _ => None,
        }
    }
}

/// Branch hint reading of the CS/DS override bytes (Jcc only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BranchHint {
    /// 0x2E
    NotTaken,
    /// 0x3E
    Taken,
}

/// One accepted legacy prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrefixSlot {
    /// The prefix byte.
    pub byte: u8,
    /// Offset of the byte within the instruction.
    pub offset: usize,
}

/// Legacy prefixes of one instruction, one optional slot per group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrefixSet {
    slots: [Option<PrefixSlot>; MAX_PREFIXES],
}

impl PrefixSet {
    /// Returns the prefix occupying `group`, if any.
    pub fn get(&self, group: PrefixGroup) -> Option<PrefixSlot> {
        self.slots[group.index()]
    }

    /// Number of legacy prefixes.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the accepted prefixes in encoding order.
    pub fn iter(&self) -> impl Iterator<Item = PrefixSlot> + '_ {
        let mut slots: Vec<PrefixSlot> = self.slots.iter().flatten().copied().collect();
        slots.sort_by_key(|slot| slot.offset);
        slots.into_iter()
    }

    fn group_byte(&self, group: PrefixGroup) -> Option<u8> {
        self.get(group).map(|slot| slot.byte)
    }

    /// LOCK prefix (0xF0)
    pub fn lock(&self) -> bool {
        self.group_byte(PrefixGroup::LockRep) == Some(LOCK)
    }

    /// REP/REPE/REPZ prefix (0xF3)
    pub fn rep(&self) -> bool {
        self.group_byte(PrefixGroup::LockRep) == Some(REP)
    }

    /// REPNE/REPNZ prefix (0xF2)
    pub fn repne(&self) -> bool {
        self.group_byte(PrefixGroup::LockRep) == Some(REPNE)
    }

    pub fn segment(&self) -> Option<Segment> {
        self.group_byte(PrefixGroup::SegmentOrHint)
            .and_then(Segment::from_prefix)
    }

    pub fn branch_hint(&self) -> Option<BranchHint> {
        match self.group_byte(PrefixGroup::SegmentOrHint) {
            Some(0x2E) => Some(BranchHint::NotTaken),
            Some(0x3E) => Some(BranchHint::Taken),
            _ => None,
        }
    }

    /// Operand size override (0x66)
    pub fn operand_size_override(&self) -> bool {
        self.get(PrefixGroup::OperandSize).is_some()
    }

    /// Address size override (0x67)
    pub fn address_size_override(&self) -> bool {
        self.get(PrefixGroup::AddressSize).is_some()
    }
}

/// Consumes the legacy prefixes at the cursor.
///
/// Stops at the first non-prefix byte (left unconsumed) or after
/// [`MAX_PREFIXES`] prefixes. A second prefix from an occupied group is
/// rejected and left unconsumed.
pub fn scan_prefixes(cursor: &mut ByteCursor<'_>, mode: Mode) -> Result<PrefixSet, DecodeError> {
    let mut prefixes = PrefixSet::default();
    let mut accepted = 0;

    while accepted < MAX_PREFIXES {
        let Some(byte) = cursor.peek() else {
            break;
        };
        let Some(group) = PrefixGroup::classify(byte) else {
            break;
        };

        let offset = cursor.position();
        if prefixes.get(group).is_some() {
            return Err(DecodeError::duplicate_prefix(group, byte, offset));
        }

        cursor.read_u8()?;
        prefixes.slots[group.index()] = Some(PrefixSlot { byte, offset });
        accepted += 1;
    }

    trace!(%mode, count = accepted, "legacy prefixes scanned");
    Ok(prefixes)
}
