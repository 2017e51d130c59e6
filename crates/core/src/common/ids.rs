//! Small copyable index types threaded through the pipeline.

use std::fmt;

/// Index of a hardware thread context (SMT sibling) within a core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u8);

/// Index of a functional-unit cluster (`§4.4`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterId(pub u8);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// An architectural register slot: the flat `ARCHREG_*` style enumeration
/// the original uses, rather than a hierarchical register model (`§3` added).
///
/// Layout: `0..16` general integer (`rax..r15`), `16` the program-counter-like
/// slot (`rip`), `17..20` the three flag groups (`zf_sf_pf`, `cf`, `of`),
/// `20..36` the 16 XMM/YMM vector lanes, `36..44` eight microcode temporaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchReg(pub u8);

impl ArchReg {
    pub const RAX: ArchReg = ArchReg(0);
    pub const RIP: ArchReg = ArchReg(16);
    pub const FLAGS_ZSP: ArchReg = ArchReg(17);
    pub const FLAGS_CF: ArchReg = ArchReg(18);
    pub const FLAGS_OF: ArchReg = ArchReg(19);
    pub const XMM_BASE: ArchReg = ArchReg(20);
    pub const MICROCODE_TEMP_BASE: ArchReg = ArchReg(36);

    pub const GPR_COUNT: u8 = 16;
    pub const XMM_COUNT: u8 = 16;
    pub const MICROCODE_TEMP_COUNT: u8 = 8;
    pub const COUNT: u8 = Self::MICROCODE_TEMP_BASE.0 + Self::MICROCODE_TEMP_COUNT;

    #[inline]
    #[must_use]
    pub fn gpr(n: u8) -> Self {
        debug_assert!(n < Self::GPR_COUNT);
        ArchReg(n)
    }

    #[inline]
    #[must_use]
    pub fn xmm(n: u8) -> Self {
        debug_assert!(n < Self::XMM_COUNT);
        ArchReg(Self::XMM_BASE.0 + n)
    }

    /// Whether this slot is one of the three pseudo-architectural flag groups
    /// that the rename tables track alongside GPRs (`§3`).
    #[inline]
    #[must_use]
    pub fn is_flag_group(self) -> bool {
        matches!(self, Self::FLAGS_ZSP | Self::FLAGS_CF | Self::FLAGS_OF)
    }

    /// Whether this slot is allowed to update committed architectural state.
    /// Microcode temporaries are scratch and never commit (`§3`).
    #[inline]
    #[must_use]
    pub fn is_architecturally_visible(self) -> bool {
        self.0 < Self::MICROCODE_TEMP_BASE.0
    }
}
