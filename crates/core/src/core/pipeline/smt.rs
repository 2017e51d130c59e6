//! SMT fetch arbitration and deadlock detection (`§4.9`).
//!
//! ICOUNT picks the least-congested thread to fetch from first each cycle;
//! the round-robin rotation of which thread gets first dispatch/rename
//! priority prevents ICOUNT alone from starving a congested thread forever.

use crate::common::ids::ThreadId;

/// Picks a fetch order for this cycle: threads sorted by ascending
/// in-flight uop count, so the least-congested thread gets first pick of
/// fetch bandwidth (`§4.9`, ICOUNT).
#[must_use]
pub fn icount_fetch_order(in_flight_uops: &[u32]) -> Vec<ThreadId> {
    let mut order: Vec<ThreadId> = (0..in_flight_uops.len() as u8).map(ThreadId).collect();
    order.sort_by_key(|t| in_flight_uops[t.0 as usize]);
    order
}

/// Rotates which thread is considered first for dispatch/rename each cycle,
/// so ICOUNT's congestion bias cannot alone starve a thread out of those
/// stages indefinitely.
pub struct RoundRobin {
    next_first: u8,
    thread_count: u8,
}

impl RoundRobin {
    #[must_use]
    pub fn new(thread_count: u8) -> Self {
        Self {
            next_first: 0,
            thread_count,
        }
    }

    #[must_use]
    pub fn order(&self) -> Vec<ThreadId> {
        (0..self.thread_count)
            .map(|i| ThreadId((self.next_first + i) % self.thread_count))
            .collect()
    }

    pub fn advance(&mut self) {
        self.next_first = (self.next_first + 1) % self.thread_count.max(1);
    }
}

/// Cycles a thread has gone without committing or dispatching, the two
/// independent counters that separately trigger the selective-flush
/// recovery and the fatal hard-deadlock watchdog (`§4.9` addition).
#[derive(Clone, Copy, Debug, Default)]
pub struct DeadlockCounters {
    pub commit_idle_cycles: u64,
    pub dispatch_idle_cycles: u64,
}

impl DeadlockCounters {
    pub fn tick(&mut self, committed: bool, dispatched: bool) {
        self.commit_idle_cycles = if committed {
            0
        } else {
            self.commit_idle_cycles + 1
        };
        self.dispatch_idle_cycles = if dispatched {
            0
        } else {
            self.dispatch_idle_cycles + 1
        };
    }

    /// Whether `dispatch_idle_cycles` has crossed `countdown` — the
    /// configured cycles of zero dispatch progress before a fine-grained,
    /// single-thread flush-and-retry kicks in (`SmtConfig::dispatch_deadlock_countdown`).
    #[must_use]
    pub fn needs_selective_flush(&self, countdown: u32) -> bool {
        self.dispatch_idle_cycles >= u64::from(countdown)
    }

    /// Fatal threshold: `per_thread_cycles × thread_count` cycles of zero
    /// commit progress core-wide means every thread is wedged and the
    /// simulation cannot make forward progress; the caller should abort
    /// rather than keep clocking (`§4.9`).
    #[must_use]
    pub fn is_hard_deadlock(&self, thread_count: u32, per_thread_cycles: u64) -> bool {
        self.commit_idle_cycles >= per_thread_cycles.saturating_mul(u64::from(thread_count.max(1)))
    }
}
