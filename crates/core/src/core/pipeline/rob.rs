//! Reorder Buffer (ROB): the per-thread circular arena of in-flight uops,
//! and the state lists that drive dispatch, issue, and commit (`§3`, `§4`).
//!
//! Each entry's `state` field *is* its list membership: it is never linked
//! into more than one list because there is only one field to hold it.
//! [`Rob::scan`] and friends replace the intrusive doubly-linked lists of
//! the original with a filtered walk over the index range `head..tail`,
//! matching the arena-plus-index strategy the rest of the core uses for
//! every non-owning cross-reference.

use crate::common::ids::{ClusterId, ThreadId};
use crate::common::Trap;
use crate::core::pipeline::lsq::LsqIdx;
use crate::core::pipeline::prf::PhysRegId;
use crate::core::pipeline::uop::{Uop, UopResult};

/// Index of an entry within one thread's ROB.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RobIdx(pub u32);

/// Bit width reserved for the ROB-index half of an IQ tag (`§4.1`); bounds
/// the largest legal `rob_size`.
pub const MAX_ROB_IDX_BIT: u32 = 12;
pub const MAX_ROB_SIZE: u32 = 1 << MAX_ROB_IDX_BIT;

/// State-list membership of a ROB entry (`§4`'s state-list chain).
///
/// `dispatched`, `ready_to_{issue,load,store}`, `issued`, `completed`, and
/// `ready_to_writeback` are per-cluster in the original; here the cluster is
/// carried inside the variant instead of selecting among per-cluster list
/// heads, since a scan-and-filter walk makes that distinction free.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RobState {
    #[default]
    Free,
    Frontend,
    ReadyToDispatch,
    Dispatched(ClusterId),
    ReadyToIssue(ClusterId),
    ReadyToLoad(ClusterId),
    ReadyToStore(ClusterId),
    Issued(ClusterId),
    TlbMiss(ClusterId),
    CacheMiss(ClusterId),
    Completed(ClusterId),
    ReadyToWriteback,
    ReadyToCommit,
}

impl RobState {
    #[must_use]
    pub fn cluster(self) -> Option<ClusterId> {
        match self {
            RobState::Dispatched(c)
            | RobState::ReadyToIssue(c)
            | RobState::ReadyToLoad(c)
            | RobState::ReadyToStore(c)
            | RobState::Issued(c)
            | RobState::TlbMiss(c)
            | RobState::CacheMiss(c)
            | RobState::Completed(c) => Some(c),
            _ => None,
        }
    }
}

/// Up to four source-operand bindings plus the optional destination.
#[derive(Clone, Copy, Debug, Default)]
pub struct OperandRefs {
    pub srcs: [Option<PhysRegId>; 4],
    pub old_dst: Option<PhysRegId>,
}

/// A single in-flight uop tracked by the ROB (`§3`'s ROB entry tuple).
#[derive(Clone)]
pub struct RobEntry {
    pub idx: RobIdx,
    pub uop: Option<Uop>,
    pub physreg: Option<PhysRegId>,
    pub operands: OperandRefs,
    pub lsq: Option<LsqIdx>,
    pub state: RobState,
    /// Cycles remaining in the entry's current timed state (FU latency,
    /// frontend delay, TLB-walk level, ...).
    pub cycles_left: u32,
    /// Cycles since completion, used to index `forward_at_cycle_lut`.
    pub forward_cycle: u32,
    pub fu_assigned: Option<u32>,
    pub issued: bool,
    /// A store has dispatched its address but not yet its data operand.
    pub load_store_second_phase: bool,
    pub lock_acquired: bool,
    /// Set when a younger mispredicted-but-committed-path correction has
    /// marked this entry for removal before it reaches `ready_to_commit`.
    pub annul_flag: bool,
    pub tlb_walk_level: u8,
    /// Other in-flight uops reading this entry's destination PR, saturating.
    pub consumer_count: u8,
    /// Architectural/pipeline-internal event raised by this uop's execution
    /// function at issue, carried forward for `detect_outcome` at commit.
    pub trap: Option<Trap>,
    /// Result computed at issue but not yet applied to the PRF, held across
    /// the functional-unit latency countdown in `Issued` (`§4.4`).
    pub pending_result: Option<UopResult>,
}

impl RobEntry {
    fn free(idx: RobIdx) -> Self {
        Self {
            idx,
            uop: None,
            physreg: None,
            operands: OperandRefs::default(),
            lsq: None,
            state: RobState::Free,
            cycles_left: 0,
            forward_cycle: 0,
            fu_assigned: None,
            issued: false,
            load_store_second_phase: false,
            lock_acquired: false,
            annul_flag: false,
            tlb_walk_level: 0,
            consumer_count: 0,
            trap: None,
            pending_result: None,
        }
    }

    #[must_use]
    pub fn entry_valid(&self) -> bool {
        self.state != RobState::Free
    }
}

/// One thread's reorder buffer: a fixed-capacity circular arena plus the
/// head/tail/count bookkeeping for in-order allocation and commit.
pub struct Rob {
    entries: Vec<RobEntry>,
    head: usize,
    tail: usize,
    count: usize,
    thread: ThreadId,
}

impl Rob {
    #[must_use]
    pub fn new(thread: ThreadId, capacity: u32) -> Self {
        assert!(capacity > 0 && capacity <= MAX_ROB_SIZE);
        let entries = (0..capacity)
            .map(|i| RobEntry::free(RobIdx(i)))
            .collect();
        Self {
            entries,
            head: 0,
            tail: 0,
            count: 0,
            thread,
        }
    }

    #[must_use]
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.count == self.entries.len()
    }

    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.entries.len() - self.count
    }

    #[must_use]
    pub fn get(&self, idx: RobIdx) -> &RobEntry {
        &self.entries[idx.0 as usize]
    }

    pub fn get_mut(&mut self, idx: RobIdx) -> &mut RobEntry {
        &mut self.entries[idx.0 as usize]
    }

    #[must_use]
    pub fn head_idx(&self) -> Option<RobIdx> {
        (self.count > 0).then(|| RobIdx(self.head as u32))
    }

    /// Allocates the next free slot onto the `Frontend` list with a uop
    /// already attached (`§4.3` steps 3 and 6 are fused here; the caller is
    /// responsible for setting `cycles_left` to the frontend delay).
    pub fn allocate(&mut self, uop: Uop) -> Option<RobIdx> {
        if self.is_full() {
            return None;
        }
        let idx = RobIdx(self.tail as u32);
        let slot = &mut self.entries[self.tail];
        *slot = RobEntry {
            uop: Some(uop),
            state: RobState::Frontend,
            ..RobEntry::free(idx)
        };
        self.tail = (self.tail + 1) % self.entries.len();
        self.count += 1;
        Some(idx)
    }

    /// Retires the head entry if it is `ReadyToCommit`. Leaves the ROB
    /// untouched and returns `None` otherwise — including when the head is
    /// marked `annul_flag`, which the commit stage must handle separately.
    pub fn commit_head(&mut self) -> Option<RobEntry> {
        if self.count == 0 {
            return None;
        }
        if self.entries[self.head].state != RobState::ReadyToCommit {
            return None;
        }
        let idx = RobIdx(self.head as u32);
        let retired = std::mem::replace(&mut self.entries[self.head], RobEntry::free(idx));
        self.head = (self.head + 1) % self.entries.len();
        self.count -= 1;
        Some(retired)
    }

    /// Iterates live entries from oldest to youngest.
    pub fn for_each(&self, mut f: impl FnMut(&RobEntry)) {
        let mut i = self.head;
        for _ in 0..self.count {
            f(&self.entries[i]);
            i = (i + 1) % self.entries.len();
        }
    }

    /// Iterates live entries in the `target` state, oldest to youngest —
    /// the scan-and-filter stand-in for walking one of the original's
    /// intrusive state lists (`§9` "cyclic references" strategy note).
    pub fn scan(&self, target: RobState, mut f: impl FnMut(&RobEntry)) {
        self.for_each_matching(|e| e.state == target, &mut f);
    }

    fn for_each_matching(&self, pred: impl Fn(&RobEntry) -> bool, f: &mut impl FnMut(&RobEntry)) {
        let mut i = self.head;
        for _ in 0..self.count {
            if pred(&self.entries[i]) {
                f(&self.entries[i]);
            }
            i = (i + 1) % self.entries.len();
        }
    }

    /// Indices of every live entry strictly younger than `idx`, from
    /// oldest to youngest, for annulment (`§4.8`).
    #[must_use]
    pub fn indices_after(&self, idx: RobIdx) -> Vec<RobIdx> {
        let mut out = Vec::new();
        let mut i = self.head;
        let mut seen_pivot = false;
        for _ in 0..self.count {
            let cur = RobIdx(i as u32);
            if seen_pivot {
                out.push(cur);
            } else if cur == idx {
                seen_pivot = true;
            }
            i = (i + 1) % self.entries.len();
        }
        out
    }

    /// Drops every live entry from `first_removed` (inclusive) through the
    /// current tail back to `Free` and rewinds the tail to `first_removed`.
    /// Callers must release each entry's PR, LSQ slot, and IQ slot
    /// themselves before calling this (`§4.8` annulment).
    pub fn truncate_from_tail(&mut self, first_removed: RobIdx) {
        let cap = self.entries.len();
        let mut i = first_removed.0 as usize;
        while i != self.tail {
            self.entries[i] = RobEntry::free(RobIdx(i as u32));
            i = (i + 1) % cap;
        }
        self.tail = first_removed.0 as usize;
        self.count = 0;
        let mut scan = self.head;
        while scan != self.tail {
            self.count += 1;
            scan = (scan + 1) % cap;
        }
    }

    /// Resets the ROB to empty without releasing external resources; the
    /// caller must have already walked and released every live entry
    /// (`§4.8` full pipeline flush).
    pub fn flush_all(&mut self) {
        for (i, slot) in self.entries.iter_mut().enumerate() {
            *slot = RobEntry::free(RobIdx(i as u32));
        }
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }
}
