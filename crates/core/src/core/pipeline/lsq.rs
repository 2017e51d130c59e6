//! Load/Store Queue (LSQ): one combined, per-thread circular queue of
//! in-flight memory uops, generalized from the store-to-load forwarding
//! idiom of a single-purpose store buffer to arbitrary byte masks and to
//! loads that need to search it too (`§3`, `§4.5`).

use crate::common::PhysAddr;
use crate::core::pipeline::rob::RobIdx;

/// Index of an entry within one thread's LSQ.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LsqIdx(pub u32);

/// Result of a store-to-load forwarding search (`§4.5`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForwardResult {
    /// An older store's bytes fully cover the load — use the forwarded data.
    Hit(u64),
    /// No older store overlaps — safe to read from the memory hierarchy.
    Miss,
    /// An older store partially overlaps; must stall until it drains.
    Stall,
}

/// A single load or store tracked by the LSQ (`§3`'s LSQ entry tuple).
#[derive(Clone, Debug)]
pub struct LsqEntry {
    pub idx: LsqIdx,
    pub owning_rob: RobIdx,
    pub is_store: bool,
    pub is_lfence: bool,
    pub is_sfence: bool,
    pub addrvalid: bool,
    pub datavalid: bool,
    /// Set once this entry no longer needs memory traffic (cancelled store,
    /// already-forwarded load) but is still occupying a slot.
    pub invalid: bool,
    pub physaddr: Option<PhysAddr>,
    /// One bit per byte actually touched, relative to `physaddr`.
    pub bytemask: u8,
    pub data: u64,
    /// Outstanding memory-hierarchy request tag, if a miss is in flight.
    pub mbtag: Option<u64>,
    pub mmio: bool,
}

impl LsqEntry {
    fn empty(idx: LsqIdx, owning_rob: RobIdx, is_store: bool) -> Self {
        Self {
            idx,
            owning_rob,
            is_store,
            is_lfence: false,
            is_sfence: false,
            addrvalid: false,
            datavalid: false,
            invalid: false,
            physaddr: None,
            bytemask: 0,
            data: 0,
            mbtag: None,
            mmio: false,
        }
    }
}

/// One thread's load/store queue: a single circular arena shared by loads
/// and stores, with independent per-type occupancy caps so a burst of
/// stores can never starve the load queue or vice versa (`§3`).
pub struct Lsq {
    entries: Vec<Option<LsqEntry>>,
    head: usize,
    tail: usize,
    count: usize,
    ldq_cap: usize,
    stq_cap: usize,
    load_count: usize,
    store_count: usize,
}

impl Lsq {
    #[must_use]
    pub fn new(ldq_cap: u32, stq_cap: u32) -> Self {
        let capacity = ldq_cap + stq_cap;
        Self {
            entries: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            count: 0,
            ldq_cap: ldq_cap as usize,
            stq_cap: stq_cap as usize,
            load_count: 0,
            store_count: 0,
        }
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
    pub fn is_full(&self) -> bool {
        self.count == self.entries.len()
    }

    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.entries.len() - self.count
    }

    /// Whether a load (`is_store = false`) or store can still be allocated
    /// given its own queue's cap, independent of the other's occupancy.
    #[must_use]
    pub fn has_room_for(&self, is_store: bool) -> bool {
        if self.count == self.entries.len() {
            return false;
        }
        if is_store {
            self.store_count < self.stq_cap
        } else {
            self.load_count < self.ldq_cap
        }
    }

    /// Reserves a slot for a load or store entering dispatch. The address
    /// and data operands are filled in later via [`Self::set_addr`] /
    /// [`Self::set_data`] as they become ready (`§4.3`: a store may dispatch
    /// address-only and return for a second-phase issue once data arrives).
    pub fn allocate(&mut self, owning_rob: RobIdx, is_store: bool) -> Option<LsqIdx> {
        if !self.has_room_for(is_store) {
            return None;
        }
        let idx = LsqIdx(self.tail as u32);
        self.entries[self.tail] = Some(LsqEntry::empty(idx, owning_rob, is_store));
        self.tail = (self.tail + 1) % self.entries.len();
        self.count += 1;
        if is_store {
            self.store_count += 1;
        } else {
            self.load_count += 1;
        }
        Some(idx)
    }

    #[must_use]
    pub fn get(&self, idx: LsqIdx) -> &LsqEntry {
        self.entries[idx.0 as usize].as_ref().expect("live LSQ index")
    }

    pub fn get_mut(&mut self, idx: LsqIdx) -> &mut LsqEntry {
        self.entries[idx.0 as usize].as_mut().expect("live LSQ index")
    }

    pub fn set_addr(&mut self, idx: LsqIdx, paddr: PhysAddr, bytemask: u8) {
        let e = self.get_mut(idx);
        e.physaddr = Some(paddr);
        e.bytemask = bytemask;
        e.addrvalid = true;
    }

    pub fn set_data(&mut self, idx: LsqIdx, data: u64) {
        let e = self.get_mut(idx);
        e.data = data;
        e.datavalid = true;
    }

    /// Searches older stores, newest first, for one whose bytes cover this
    /// load's address range. Assumes both masks describe a contiguous byte
    /// range starting at their respective `physaddr` (true of every x86
    /// load/store width); generalizes the original's fixed-width
    /// shift-and-mask forwarding check to that arbitrary range.
    #[must_use]
    pub fn forward_load(&self, load: LsqIdx, paddr: PhysAddr, bytemask: u8) -> ForwardResult {
        let load_size = bytemask.count_ones() as u64;
        let load_start = paddr.val();
        let load_end = load_start + load_size;

        let mut i = (load.0 as usize + self.entries.len() - 1) % self.entries.len();
        for _ in 0..self.count {
            if let Some(entry) = &self.entries[i] {
                if entry.is_store && entry.addrvalid && !entry.invalid {
                    if let Some(store_paddr) = entry.physaddr {
                        let store_size = entry.bytemask.count_ones() as u64;
                        let store_start = store_paddr.val();
                        let store_end = store_start + store_size;

                        if load_start < store_end && load_end > store_start {
                            if store_start <= load_start && store_end >= load_end {
                                if !entry.datavalid {
                                    return ForwardResult::Stall;
                                }
                                let byte_shift = (load_start - store_start) * 8;
                                let shifted = entry.data >> byte_shift;
                                let mask = if load_size >= 8 {
                                    u64::MAX
                                } else {
                                    (1u64 << (load_size * 8)) - 1
                                };
                                return ForwardResult::Hit(shifted & mask);
                            }
                            return ForwardResult::Stall;
                        }
                    }
                }
            }
            i = (i + self.entries.len() - 1) % self.entries.len();
        }
        ForwardResult::Miss
    }

    /// Releases the entry at `idx`; `idx` need not be the head (a load may
    /// drain out of FIFO order once its ROB entry commits and its forwarding
    /// dependency is resolved). Gaps are tolerated: [`Self::len`] tracks
    /// occupied slots, not a contiguous prefix.
    pub fn release(&mut self, idx: LsqIdx) {
        let pos = idx.0 as usize;
        if let Some(entry) = self.entries[pos].take() {
            self.count -= 1;
            if entry.is_store {
                self.store_count -= 1;
            } else {
                self.load_count -= 1;
            }
            while self.head != self.tail && self.entries[self.head].is_none() {
                self.head = (self.head + 1) % self.entries.len();
            }
        }
    }

    pub fn flush_all(&mut self) {
        for e in &mut self.entries {
            *e = None;
        }
        self.head = 0;
        self.tail = 0;
        self.count = 0;
        self.load_count = 0;
        self.store_count = 0;
    }

    /// Iterates live entries oldest-to-youngest.
    pub fn for_each(&self, mut f: impl FnMut(&LsqEntry)) {
        for e in self.entries.iter().flatten() {
            f(e);
        }
    }

    /// Finds the entry still waiting on outstanding memory request `tag`,
    /// clears its `mbtag`, and returns its index so the caller can put the
    /// owning ROB entry back on the issue-ready list.
    pub fn take_completed(&mut self, tag: u64) -> Option<LsqIdx> {
        for e in self.entries.iter_mut().flatten() {
            if e.mbtag == Some(tag) {
                e.mbtag = None;
                return Some(e.idx);
            }
        }
        None
    }
}
