//! Issue Queue (IQ): a per-cluster associative tag store that drives
//! broadcast wakeup and per-cycle issue selection (`§3`, `§4.1`).

use crate::common::ids::ThreadId;
use crate::core::pipeline::rob::RobIdx;

/// An issue-queue tag: `thread_id` in the high bits, ROB index in the low
/// bits (`§4.1`). The encoding must admit at least 16 threads × 4096 ROB
/// entries, so the low 12 bits carry the ROB index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IqTag(u32);

const ROB_IDX_BITS: u32 = 12;
const ROB_IDX_MASK: u32 = (1 << ROB_IDX_BITS) - 1;

impl IqTag {
    #[must_use]
    pub fn new(thread: ThreadId, rob_idx: RobIdx) -> Self {
        debug_assert!(rob_idx.0 <= ROB_IDX_MASK);
        Self(((thread.0 as u32) << ROB_IDX_BITS) | rob_idx.0)
    }

    #[must_use]
    pub fn thread(self) -> ThreadId {
        ThreadId((self.0 >> ROB_IDX_BITS) as u8)
    }

    #[must_use]
    pub fn rob_idx(self) -> RobIdx {
        RobIdx(self.0 & ROB_IDX_MASK)
    }
}

/// Slot index within one cluster's issue queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IqSlotId(pub u32);

#[derive(Clone, Copy)]
struct Slot {
    tag: IqTag,
    operand_tags: [Option<IqTag>; 4],
    operand_ready: [bool; 4],
    issued: bool,
}

impl Slot {
    fn all_ready(&self) -> bool {
        self.operand_ready.iter().all(|&r| r)
    }
}

/// One cluster's issue queue: a flat associative array of occupied slots
/// plus a shared/reserved free-entry split per `§3`'s reservation
/// discipline, so no thread can be starved out of issue by its siblings.
pub struct IssueQueue {
    slots: Vec<Option<Slot>>,
    reserved_per_thread: u32,
    thread_count: u32,
    occupied_per_thread: Vec<u32>,
}

impl IssueQueue {
    #[must_use]
    pub fn new(size: u32, thread_count: u32) -> Self {
        let reserved_per_thread = ((size / thread_count.max(1)) as f64).sqrt().floor() as u32;
        Self {
            slots: (0..size).map(|_| None).collect(),
            reserved_per_thread,
            thread_count,
            occupied_per_thread: vec![0; thread_count.max(1) as usize],
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    #[must_use]
    pub fn shared_free_entries(&self) -> u32 {
        let reserved_total = self.reserved_per_thread * self.thread_count;
        let free = self.slots.len() as u32 - self.occupied() as u32;
        free.saturating_sub(reserved_total.saturating_sub(self.occupied_in_reserve()))
    }

    fn occupied_in_reserve(&self) -> u32 {
        self.occupied_per_thread
            .iter()
            .map(|&n| n.min(self.reserved_per_thread))
            .sum()
    }

    /// Whether `thread` can still insert given the reservation discipline:
    /// it may always use its reserved share, and may additionally draw from
    /// the shared pool if any remains (`§3`).
    #[must_use]
    pub fn has_room_for(&self, thread: ThreadId) -> bool {
        let t = thread.0 as usize;
        if t >= self.occupied_per_thread.len() {
            return false;
        }
        if self.occupied_per_thread[t] < self.reserved_per_thread {
            return true;
        }
        self.shared_free_entries() > 0
    }

    /// Inserts a new uop with up to four operand tags, each `preready` or
    /// not. Returns the slot it landed in.
    pub fn insert(
        &mut self,
        tag: IqTag,
        operand_tags: [Option<IqTag>; 4],
        preready: [bool; 4],
    ) -> Option<IqSlotId> {
        if !self.has_room_for(tag.thread()) {
            return None;
        }
        let free = self.slots.iter().position(|s| s.is_none())?;
        self.slots[free] = Some(Slot {
            tag,
            operand_tags,
            operand_ready: preready,
            issued: false,
        });
        self.occupied_per_thread[tag.thread().0 as usize] += 1;
        Some(IqSlotId(free as u32))
    }

    /// Marks every slot's operand matching `producer` ready, in a single
    /// atomic sweep (`§3`'s "atomic per cycle" broadcast).
    pub fn broadcast(&mut self, producer: IqTag) {
        for slot in self.slots.iter_mut().flatten() {
            for (tag, ready) in slot.operand_tags.iter().zip(slot.operand_ready.iter_mut()) {
                if *tag == Some(producer) {
                    *ready = true;
                }
            }
        }
    }

    /// Returns one ready, unissued slot, marking it issued. The caller is
    /// expected to call this at most `cluster.issue_width` times per cycle.
    pub fn issue(&mut self) -> Option<(IqSlotId, IqTag)> {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Some(s) = slot {
                if !s.issued && s.all_ready() {
                    s.issued = true;
                    return Some((IqSlotId(i as u32), s.tag));
                }
            }
        }
        None
    }

    /// Clears the issued bit so the uop re-enters the wakeup competition
    /// (a functional-unit conflict or replay-triggering trap).
    pub fn replay(&mut self, slot: IqSlotId) {
        if let Some(s) = &mut self.slots[slot.0 as usize] {
            s.issued = false;
        }
    }

    /// Removes a slot on normal completion.
    pub fn release(&mut self, slot: IqSlotId) {
        if let Some(s) = self.slots[slot.0 as usize].take() {
            self.occupied_per_thread[s.tag.thread().0 as usize] -= 1;
        }
    }

    /// Removes a slot on annulment; identical bookkeeping to `release`, kept
    /// as a distinct name so call sites read as what they mean.
    pub fn annul(&mut self, slot: IqSlotId) {
        self.release(slot);
    }

    #[must_use]
    pub fn find_slot(&self, tag: IqTag) -> Option<IqSlotId> {
        self.slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| s.tag == tag))
            .map(|i| IqSlotId(i as u32))
    }

    /// Releases every slot belonging to `thread`, used on full pipeline
    /// flush and mispredict annulment where the doomed entries' owning
    /// cluster is only known by walking the issue queues themselves.
    pub fn release_thread(&mut self, thread: ThreadId) {
        for i in 0..self.slots.len() {
            if self.slots[i].as_ref().is_some_and(|s| s.tag.thread() == thread) {
                self.release(IqSlotId(i as u32));
            }
        }
    }
}
