//! The uop itself: opcode class, operand slots, and the opaque execution
//! function supplied by the (external) micro-op synthesizer.

use crate::common::ids::ArchReg;
use crate::common::{Trap, VirtAddr};

/// The uop classes that drive functional-unit and cluster legality (`§3` added).
///
/// Deliberately coarse: the core routes and schedules by class, it never
/// interprets the semantics of an opcode. See [`UopExec`] for the part of
/// the original's per-opcode function-pointer table this crate keeps opaque.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpClass {
    IntAlu,
    IntMulDiv,
    Load,
    Store,
    Branch,
    FpVector,
    Fence,
    Nop,
    Microcode,
}

impl OpClass {
    /// Whether a uop of this class participates in the load/store queue.
    #[must_use]
    pub fn is_memory(self) -> bool {
        matches!(self, OpClass::Load | OpClass::Store)
    }
}

/// Result bundle produced by a uop's execution function: a value per lane
/// plus the invalid-flag bit that is the in-pipeline exception signal (`§7`).
#[derive(Clone, Copy, Debug, Default)]
pub struct UopResult {
    pub value: u64,
    pub flags_zf: bool,
    pub flags_sf: bool,
    pub flags_pf: bool,
    pub flags_cf: bool,
    pub flags_of: bool,
    pub trap: Option<Trap>,
}

impl UopResult {
    #[must_use]
    pub fn ok(value: u64) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn faulted(trap: Trap) -> Self {
        Self {
            trap: Some(trap),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.trap.is_some()
    }
}

/// The opaque per-uop execution function (`§1`, `§9` "deep polymorphism"):
/// a table of closures keyed by `{opcode class, ...}` in the runtime, never
/// a trait hierarchy. The core calls it exactly once, at issue.
pub type UopExec = std::sync::Arc<dyn Fn(&[u64; 4]) -> UopResult + Send + Sync>;

/// Bitmask of flag groups a uop actually writes, used at rename (`§4.3` step 5)
/// and at commit (`§4.6` step 6) to rename/update flag groups independently.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetFlagsMask {
    pub zsp: bool,
    pub cf: bool,
    pub of: bool,
}

/// A single decoded micro-operation as carried from fetch through commit.
#[derive(Clone)]
pub struct Uop {
    pub op_class: OpClass,
    /// `rip` of the macro-op this uop belongs to.
    pub rip: VirtAddr,
    /// Byte length of the macro-op, added to `rip` at commit on non-branch EOM.
    pub macro_op_bytes: u32,
    /// Monotonically increasing per-thread fetch sequence number (`§8` invariant 8).
    pub fetch_uuid: u64,
    /// Start-of-macro-op marker: this uop is the first of an x86 instruction.
    pub som: bool,
    /// End-of-macro-op marker: this uop is the last of an x86 instruction.
    pub eom: bool,
    /// Source architectural registers read by this uop (up to 4 operands).
    pub src_regs: [Option<ArchReg>; 4],
    /// Destination architectural register, if any.
    pub dst_reg: Option<ArchReg>,
    /// Flag groups this uop actually writes.
    pub set_flags: SetFlagsMask,
    /// Whether this uop is a locked read-modify-write load (`ld.acq`).
    pub is_locked_load: bool,
    /// Predicted taken/fallthrough target, installed by fetch (`§4.7`).
    pub predicted_target: Option<VirtAddr>,
    /// The opaque execution function (`§1`).
    pub exec: UopExec,
}

impl std::fmt::Debug for Uop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uop")
            .field("op_class", &self.op_class)
            .field("rip", &self.rip)
            .field("fetch_uuid", &self.fetch_uuid)
            .field("som", &self.som)
            .field("eom", &self.eom)
            .finish_non_exhaustive()
    }
}
