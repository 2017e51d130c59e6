//! Register Rename Tables (RRT): one array per architectural register slot,
//! each entry pointing at the physical register currently backing it
//! (`§3`, `§4.3`, `§4.6`).
//!
//! Generalized from an array-indexed scoreboard that maps a register to its
//! in-flight producer's tag: here the array instead maps a register to the
//! physical register holding its value directly, because every value lives
//! in a PR rather than inside a ROB entry.

use crate::common::ids::ArchReg;
use crate::core::pipeline::prf::{PhysRegId, ZERO_REG};

/// One rename table: `specRRT` (speculative, updated at rename) or
/// `commitRRT` (architectural, updated at commit) use the same shape.
#[derive(Clone)]
pub struct RenameTable {
    slots: Vec<PhysRegId>,
}

impl RenameTable {
    /// Builds a table with every slot pointing at the zero register.
    /// Callers must repoint every slot at a real architectural PR before
    /// use (`external_to_core_state`, `§4.8`).
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![ZERO_REG; ArchReg::COUNT as usize],
        }
    }

    #[must_use]
    pub fn get(&self, reg: ArchReg) -> PhysRegId {
        self.slots[reg.0 as usize]
    }

    pub fn set(&mut self, reg: ArchReg, pr: PhysRegId) {
        self.slots[reg.0 as usize] = pr;
    }

    /// Overwrites every slot from `other`, used to restore a speculative
    /// table to a commit-time or annulment-time snapshot in one step.
    pub fn copy_from(&mut self, other: &RenameTable) {
        self.slots.copy_from_slice(&other.slots);
    }

    /// Iterates `(register, physreg)` pairs for every architecturally
    /// visible slot, used by `external_to_core_state` and by snapshotting.
    pub fn for_each_architectural(&self, mut f: impl FnMut(ArchReg, PhysRegId)) {
        for i in 0..ArchReg::COUNT {
            let reg = ArchReg(i);
            if reg.is_architecturally_visible() {
                f(reg, self.slots[i as usize]);
            }
        }
    }
}

impl Default for RenameTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The pair of rename tables a thread context owns (`§3`): `spec` is
/// updated at rename and read by dispatch to find operand PRs; `commit` is
/// updated only at commit and is the source of truth for flush/annul
/// reconstruction.
#[derive(Clone, Default)]
pub struct RegisterRenameTables {
    pub spec: RenameTable,
    pub commit: RenameTable,
}

impl RegisterRenameTables {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Points both tables at the same PR for every architectural register,
    /// used by `external_to_core_state` on a full pipeline flush (`§4.8`).
    pub fn reset_to(&mut self, mut prs: impl FnMut(ArchReg) -> PhysRegId) {
        for i in 0..ArchReg::COUNT {
            let reg = ArchReg(i);
            let pr = prs(reg);
            self.spec.set(reg, pr);
            self.commit.set(reg, pr);
        }
    }
}
