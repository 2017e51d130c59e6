//! Per-thread pipeline state: everything one SMT sibling owns exclusively,
//! as opposed to the PRFs/IQs/interlock buffer shared across a core (`§2`).

use crate::common::ids::ThreadId;
use crate::common::VirtAddr;
use crate::core::pipeline::fetch::FetchQueue;
use crate::core::pipeline::lsq::Lsq;
use crate::core::pipeline::rob::Rob;
use crate::core::pipeline::rrt::RegisterRenameTables;
use crate::core::pipeline::smt::DeadlockCounters;

/// One hardware thread's exclusive pipeline state (`§2`): fetch pointer,
/// ROB, LSQ, rename tables, and per-thread counters.
pub struct ThreadContext {
    pub id: ThreadId,
    pub rip: VirtAddr,
    /// Uops already consumed from the basic block currently at `rip`, so
    /// fetch can resume mid-block once `FETCH_WIDTH` caps a cycle short of
    /// the block's end (`§4.1`; `BasicBlockCache::lookup` is keyed only by
    /// `start_rip`, not by a mid-block position).
    pub fetch_offset: u32,
    pub fetchq: FetchQueue,
    pub rob: Rob,
    pub lsq: Lsq,
    pub rrt: RegisterRenameTables,
    pub deadlock: DeadlockCounters,
    pub committed_uops: u64,
    pub committed_macro_ops: u64,
    /// True once this thread has hit `Stop`/an unhandled exception and
    /// should no longer fetch or be picked by the SMT arbiter.
    pub halted: bool,
}

impl ThreadContext {
    #[must_use]
    pub fn new(
        id: ThreadId,
        rob_size: u32,
        ldq_size: u32,
        stq_size: u32,
        fetchq_size: u32,
        start_rip: VirtAddr,
    ) -> Self {
        Self {
            id,
            rip: start_rip,
            fetch_offset: 0,
            fetchq: FetchQueue::new(fetchq_size as usize),
            rob: Rob::new(id, rob_size),
            lsq: Lsq::new(ldq_size, stq_size),
            rrt: RegisterRenameTables::new(),
            deadlock: DeadlockCounters::default(),
            committed_uops: 0,
            committed_macro_ops: 0,
            halted: false,
        }
    }

    #[must_use]
    pub fn in_flight_uops(&self) -> u32 {
        self.rob.len() as u32 + self.fetchq.len() as u32
    }
}
