//! Physical Register File (`§3`, `§4.2`).
//!
//! A ref-counted pool of physical registers backing one uop operand class
//! (integer, fp/vector, store-buffer, branch). Grounded on the ROB's
//! circular-arena-plus-free-list shape, generalized to the PR lifecycle
//! state machine `FREE → WAITING → BYPASS → WRITTEN → ARCH → {PENDINGFREE,
//! FREE}`.

use crate::common::ids::{ArchReg, ThreadId};
use crate::core::pipeline::rob::RobIdx;

/// Index of a physical register within one file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PhysRegId(pub u32);

/// Lifecycle state of a physical register (`§3`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PrState {
    #[default]
    Free,
    /// Allocated, result not yet produced.
    Waiting,
    /// Result produced at issue; still propagating through the bypass network.
    Bypass,
    /// Writeback has run; value is final but not yet architectural.
    Written,
    /// Backs exactly one architectural slot in the commit rename table.
    Arch,
    /// Last architectural owner overwritten; still referenced by in-flight uops.
    PendingFree,
}

/// Reserved index of the permanent zero register in every file (`§4.2`).
pub const ZERO_REG: PhysRegId = PhysRegId(0);

/// One physical register (`§3`'s PR tuple).
#[derive(Clone, Debug)]
pub struct PhysReg {
    pub index: PhysRegId,
    pub data: u64,
    pub flag: bool,
    /// Architectural register this PR was renamed for, if any.
    pub archreg_written: Option<ArchReg>,
    /// ROB entry that produces this PR's value, if any (weak back-reference).
    pub owning_rob: Option<RobIdx>,
    pub refcount: u32,
    pub thread_owner: Option<ThreadId>,
    pub state: PrState,
}

impl PhysReg {
    fn reset(&mut self) {
        self.data = 0xDEAD_BEEF_DEAD_BEEF;
        self.flag = false;
        self.archreg_written = None;
        self.owning_rob = None;
        self.refcount = 0;
        self.thread_owner = None;
        self.state = PrState::Free;
    }
}

/// One uop-class-partitioned pool of physical registers (`§3`).
///
/// Index 0 is the reserved zero register: permanently `Arch`, never freed,
/// and legally holds a refcount above every other entry in the file.
pub struct PhysicalRegisterFile {
    regs: Vec<PhysReg>,
    free_list: Vec<PhysRegId>,
    pending_free: Vec<PhysRegId>,
}

impl PhysicalRegisterFile {
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        assert!(capacity >= 1, "PRF must hold at least the zero register");
        let mut regs = Vec::with_capacity(capacity as usize);
        regs.push(PhysReg {
            index: ZERO_REG,
            data: 0,
            flag: false,
            archreg_written: None,
            owning_rob: None,
            refcount: 1,
            thread_owner: None,
            state: PrState::Arch,
        });
        let free_list = (1..capacity)
            .map(|i| {
                regs.push(PhysReg {
                    index: PhysRegId(i),
                    data: 0,
                    flag: false,
                    archreg_written: None,
                    owning_rob: None,
                    refcount: 0,
                    thread_owner: None,
                    state: PrState::Free,
                });
                PhysRegId(i)
            })
            .collect();
        Self {
            regs,
            free_list,
            pending_free: Vec::new(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.regs.len()
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    #[must_use]
    pub fn get(&self, id: PhysRegId) -> &PhysReg {
        &self.regs[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: PhysRegId) -> &mut PhysReg {
        &mut self.regs[id.0 as usize]
    }

    /// Allocates a PR from the free list in `Waiting` state, owned by
    /// `thread` and `rob`. Returns `None` on exhaustion — the caller
    /// (rename) must stall, never spill or evict (`§4.2`).
    pub fn alloc(&mut self, thread: ThreadId, rob: RobIdx) -> Option<PhysRegId> {
        let id = self.free_list.pop()?;
        let reg = &mut self.regs[id.0 as usize];
        reg.data = 0xDEAD_BEEF_DEAD_BEEF;
        reg.state = PrState::Waiting;
        reg.thread_owner = Some(thread);
        reg.owning_rob = Some(rob);
        reg.refcount = 1;
        Some(id)
    }

    /// Increments refcount for a new reference (ROB operand, specRRT, or
    /// commitRRT entry pointing at this PR).
    pub fn incref(&mut self, id: PhysRegId) {
        self.regs[id.0 as usize].refcount += 1;
    }

    /// Decrements refcount for a released reference. If the register is in
    /// `PendingFree` and refcount reaches zero, it returns to `Free`.
    /// Decrementing a PR to zero while still `Arch` is a caller bug (`§4.2`).
    pub fn decref(&mut self, id: PhysRegId) {
        if id == ZERO_REG {
            return;
        }
        let reg = &mut self.regs[id.0 as usize];
        debug_assert!(reg.refcount > 0, "refcount underflow on PR {}", id.0);
        reg.refcount -= 1;
        debug_assert!(
            !(reg.refcount == 0 && reg.state == PrState::Arch),
            "PR {} dropped to zero refs while still architectural",
            id.0
        );
        if reg.refcount == 0 && reg.state == PrState::PendingFree {
            reg.reset();
            self.free_list.push(id);
        }
    }

    /// Issue-time completion: `Waiting` → `Bypass`.
    pub fn complete(&mut self, id: PhysRegId, data: u64, flag: bool) {
        let reg = &mut self.regs[id.0 as usize];
        reg.data = data;
        reg.flag = flag;
        reg.state = PrState::Bypass;
    }

    /// Writeback: `Bypass` → `Written`.
    pub fn writeback(&mut self, id: PhysRegId) {
        self.regs[id.0 as usize].state = PrState::Written;
    }

    /// Commit: `Written` → `Arch`, overwriting the previous architectural
    /// mapping `old`. `old` moves to `PendingFree` if still referenced, or
    /// straight back to `Free` otherwise.
    pub fn commit(&mut self, new: PhysRegId, old: Option<PhysRegId>) {
        self.regs[new.0 as usize].state = PrState::Arch;
        if let Some(old) = old {
            if old == ZERO_REG {
                return;
            }
            let reg = &mut self.regs[old.0 as usize];
            if reg.refcount == 0 {
                reg.reset();
                self.free_list.push(old);
            } else {
                reg.state = PrState::PendingFree;
            }
        }
    }

    /// Scans `PendingFree` entries and frees any whose refcount has dropped
    /// to zero since last scan. Normally redundant with the eager check in
    /// [`Self::decref`]; kept for parity with the original's sweep and as a
    /// consistency check under debug assertions.
    pub fn cleanup(&mut self) {
        self.pending_free.clear();
        for reg in &mut self.regs {
            if reg.state == PrState::PendingFree && reg.refcount == 0 {
                reg.reset();
                self.free_list.push(reg.index);
            }
        }
    }

    /// Releases every PR owned by `thread`, used on full pipeline flush.
    /// The zero register is exempt.
    pub fn reset_thread(&mut self, thread: ThreadId) {
        for reg in &mut self.regs {
            if reg.index != ZERO_REG && reg.thread_owner == Some(thread) {
                reg.reset();
                self.free_list.push(reg.index);
            }
        }
    }
}
