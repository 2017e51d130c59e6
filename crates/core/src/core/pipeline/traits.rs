//! External interfaces the core drives but never implements: the host
//! environment, the memory hierarchy, the pre-translated basic-block cache,
//! and the branch predictor (`§5`).

use crate::common::ids::ThreadId;
use crate::common::{PhysAddr, Trap, TranslationResult, VirtAddr};
use crate::core::pipeline::uop::Uop;

/// Host-supplied services a running core needs but does not own: reading
/// and writing architectural register state and raising out-of-band events
/// that are not modeled as in-pipeline traps (`§5`).
pub trait HostContext {
    fn read_arch_gpr(&self, thread: ThreadId, index: u8) -> u64;
    fn write_arch_gpr(&mut self, thread: ThreadId, index: u8, value: u64);
    fn read_arch_rip(&self, thread: ThreadId) -> VirtAddr;
    fn write_arch_rip(&mut self, thread: ThreadId, rip: VirtAddr);
    /// Translates a virtual address for fetch (ITLB) or load/store (DTLB).
    fn translate(&mut self, thread: ThreadId, vaddr: VirtAddr, for_write: bool) -> TranslationResult;
}

/// Outstanding memory-hierarchy request handle, returned by a miss request
/// and later matched against a completion callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemRequestTag(pub u64);

/// The timing model behind loads, stores, and page-table walks (`§4.5`).
/// Every request is asynchronous: the core parks the requesting uop on a
/// side list and polls completion on a later cycle via [`Self::poll`].
pub trait MemoryHierarchy {
    fn request_load(&mut self, thread: ThreadId, paddr: PhysAddr, bytes: u8) -> MemRequestTag;
    fn request_store(&mut self, thread: ThreadId, paddr: PhysAddr, bytes: u8, data: u64);
    fn request_pte_fetch(&mut self, thread: ThreadId, vaddr: VirtAddr, level: u8) -> MemRequestTag;
    /// Drains completions ready as of this cycle.
    fn poll(&mut self) -> Vec<MemRequestTag>;
}

/// One pre-decoded run of uops sharing a starting `rip`, as produced by the
/// external translator and fed to fetch a block at a time (`§1`, `§4.1`).
pub struct BasicBlock {
    pub start_rip: VirtAddr,
    pub byte_length: u32,
    pub uops: Vec<Uop>,
    /// Fallthrough target if no branch in the block is taken.
    pub fallthrough_rip: VirtAddr,
}

/// Looks up pre-translated basic blocks by starting `rip`; a miss means
/// fetch must stall for the external translator, modeled here as `None`
/// rather than a blocking call (`§4.1`).
pub trait BasicBlockCache {
    fn lookup(&self, rip: VirtAddr) -> Option<&BasicBlock>;
    /// Invalidates any cached block overlapping the written byte range,
    /// the trigger for a [`Trap::SelfModifyingCode`] event (`§7`).
    fn invalidate_range(&mut self, start: VirtAddr, len: u64);
}

/// A stable handle identifying one speculative prediction, threaded through
/// `predict`/`update`/`updateras`/`annulras` so the predictor can locate its
/// own bookkeeping for that prediction later (`§5`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PredictionHandle(pub u64);

/// Branch outcome kind, supplied at `predict` time and confirmed (or
/// contradicted) at `update` time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BranchKind {
    Conditional,
    IndirectJump,
    Call,
    Return,
}

pub trait BranchPredictor {
    fn init(&mut self, thread: ThreadId);
    fn predict(
        &mut self,
        thread: ThreadId,
        handle: PredictionHandle,
        kind: BranchKind,
        rip_after: VirtAddr,
    ) -> VirtAddr;
    fn update_ras(&mut self, thread: ThreadId, handle: PredictionHandle, rip_after: VirtAddr);
    fn annul_ras(&mut self, thread: ThreadId, handle: PredictionHandle);
    fn update(
        &mut self,
        thread: ThreadId,
        handle: PredictionHandle,
        rip_after: VirtAddr,
        actual_target: VirtAddr,
    );
}

/// Outcome of committing one macro-op, reported to the host (`§4.6`, `§7`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Ok,
    None,
    Exception(Trap),
    Barrier,
    Smc,
    Interrupt,
    Stop,
}

/// What `run_cycle` accomplished this cycle, surfaced to the host loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunCycleResult {
    pub committed_uops: u32,
    pub committed_macro_ops: u32,
    pub outcome: Option<CommitOutcome>,
    /// Set once any thread's commit-idle watchdog has crossed
    /// `commit_deadlock_cycles_per_thread × thread_count` with zero
    /// core-wide commit progress (`§4.9`); the host should abort and dump
    /// state rather than keep clocking.
    pub hard_deadlock: bool,
}
