//! Fetch: pulls uops from the pre-translated basic-block cache into a
//! per-thread fetch queue, tracks the in-flight ITLB walk for a miss, and
//! maintains the process-wide unaligned-access predictor (`§4.1`, `§3`).

use std::collections::VecDeque;

use crate::common::VirtAddr;
use crate::core::pipeline::uop::Uop;

/// One uop sitting in the fetch queue, not yet renamed.
pub struct FetchEntry {
    pub uop: Uop,
}

/// Per-thread queue of fetched-but-not-renamed uops, plus the state of an
/// in-flight ITLB walk for the block fetch currently blocked on one.
pub struct FetchQueue {
    queue: VecDeque<FetchEntry>,
    capacity: usize,
    pub itlb_walk_level: Option<u8>,
    pub next_fetch_uuid: u64,
}

impl FetchQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            itlb_walk_level: None,
            next_fetch_uuid: 0,
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.capacity
    }

    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.capacity - self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn push(&mut self, mut uop: Uop) -> bool {
        if self.is_full() {
            return false;
        }
        uop.fetch_uuid = self.next_fetch_uuid;
        self.next_fetch_uuid += 1;
        self.queue.push_back(FetchEntry { uop });
        true
    }

    #[must_use]
    pub fn front(&self) -> Option<&Uop> {
        self.queue.front().map(|e| &e.uop)
    }

    pub fn pop(&mut self) -> Option<Uop> {
        self.queue.pop_front().map(|e| e.uop)
    }

    /// Drops every entry with `fetch_uuid` strictly greater than `keep`, the
    /// fetch-side half of a mispredict annulment (`§4.8`): entries already
    /// consumed into the ROB are unaffected.
    pub fn truncate_after(&mut self, keep: u64) {
        self.queue.retain(|e| e.uop.fetch_uuid <= keep);
    }

    pub fn flush(&mut self) {
        self.queue.clear();
        self.itlb_walk_level = None;
    }
}

/// Process-wide unaligned-access predictor: a power-of-two-sized bit array
/// hashed from `(rip, physical frame)`, set once an access at that `rip`
/// is observed to straddle a boundary so later dispatches of the same
/// instruction can route it down the slow split-access path proactively
/// (`§3`).
pub struct UnalignedPredictor {
    bits: Vec<bool>,
    mask: u64,
}

impl UnalignedPredictor {
    #[must_use]
    pub fn new(size: u64) -> Self {
        assert!(size.is_power_of_two());
        Self {
            bits: vec![false; size as usize],
            mask: size - 1,
        }
    }

    fn hash(&self, rip: VirtAddr, frame: u64) -> usize {
        let h = rip.val().wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ frame;
        (h & self.mask) as usize
    }

    #[must_use]
    pub fn predict(&self, rip: VirtAddr, frame: u64) -> bool {
        self.bits[self.hash(rip, frame)]
    }

    pub fn record_unaligned(&mut self, rip: VirtAddr, frame: u64) {
        let idx = self.hash(rip, frame);
        self.bits[idx] = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::ArchReg;
    use crate::core::pipeline::uop::{OpClass, SetFlagsMask, UopResult};

    fn dummy() -> Uop {
        Uop {
            op_class: OpClass::IntAlu,
            rip: VirtAddr(0),
            macro_op_bytes: 1,
            fetch_uuid: 0,
            som: true,
            eom: true,
            src_regs: [None; 4],
            dst_reg: Some(ArchReg::RAX),
            set_flags: SetFlagsMask::default(),
            is_locked_load: false,
            predicted_target: None,
            exec: std::sync::Arc::new(|_| UopResult::ok(0)),
        }
    }

    #[test]
    fn push_assigns_increasing_fetch_uuids() {
        let mut fq = FetchQueue::new(4);
        let _ = fq.push(dummy());
        let _ = fq.push(dummy());
        assert_eq!(fq.pop().unwrap().fetch_uuid, 0);
        assert_eq!(fq.pop().unwrap().fetch_uuid, 1);
    }

    #[test]
    fn full_queue_rejects_push() {
        let mut fq = FetchQueue::new(1);
        assert!(fq.push(dummy()));
        assert!(!fq.push(dummy()));
    }

    #[test]
    fn truncate_after_drops_younger_entries() {
        let mut fq = FetchQueue::new(4);
        let _ = fq.push(dummy());
        let _ = fq.push(dummy());
        let _ = fq.push(dummy());
        fq.truncate_after(0);
        assert_eq!(fq.len(), 1);
    }

    #[test]
    fn predictor_remembers_recorded_misalignment() {
        let mut p = UnalignedPredictor::new(1024);
        let rip = VirtAddr(0x4000);
        assert!(!p.predict(rip, 0x1000));
        p.record_unaligned(rip, 0x1000);
        assert!(p.predict(rip, 0x1000));
    }
}
