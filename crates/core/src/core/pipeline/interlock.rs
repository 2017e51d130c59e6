//! Memory interlock buffer: tracks which core/thread/ROB entry currently
//! holds the lock on a physical address for an atomic read-modify-write,
//! so a locked load's matching store is guaranteed to commit without an
//! intervening remote write (`§4.8`'s "locked memory conflicts" mechanism).

use std::collections::HashMap;

use crate::common::ids::ThreadId;
use crate::common::PhysAddr;
use crate::core::pipeline::rob::RobIdx;

/// Owner of one held interlock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockOwner {
    pub thread: ThreadId,
    pub rob: RobIdx,
}

/// Process-wide map from cache-line address to its current lock holder.
/// A core's locked load acquires the line on issue and releases it at
/// commit (or on annulment), deferred exactly like LSQ/PR release.
#[derive(Default)]
pub struct InterlockBuffer {
    locks: HashMap<u64, LockOwner>,
    line_size: u64,
}

impl InterlockBuffer {
    #[must_use]
    pub fn new(line_size: u64) -> Self {
        debug_assert!(line_size.is_power_of_two());
        Self {
            locks: HashMap::new(),
            line_size,
        }
    }

    /// Attempts to acquire the lock on `addr`'s line for `owner`. Fails if
    /// a different owner already holds it; succeeds (idempotently) if the
    /// same owner re-requests its own lock.
    pub fn try_acquire(&mut self, addr: PhysAddr, owner: LockOwner) -> bool {
        let line = addr.line(self.line_size).val();
        match self.locks.get(&line) {
            Some(existing) if *existing != owner => false,
            _ => {
                let _ = self.locks.insert(line, owner);
                true
            }
        }
    }

    pub fn release(&mut self, addr: PhysAddr, owner: LockOwner) {
        let line = addr.line(self.line_size).val();
        if self.locks.get(&line) == Some(&owner) {
            let _ = self.locks.remove(&line);
        }
    }

    /// Releases every lock held by `owner`, used on a full pipeline flush.
    pub fn release_all_for(&mut self, owner_thread: ThreadId) {
        self.locks.retain(|_, owner| owner.thread != owner_thread);
    }

    #[must_use]
    pub fn is_locked_by_other(&self, addr: PhysAddr, owner: LockOwner) -> bool {
        let line = addr.line(self.line_size).val();
        matches!(self.locks.get(&line), Some(existing) if *existing != owner)
    }
}
