//! `mockall`-generated mocks for the traits `Core` drives, plus a couple of
//! small hand-written fakes where a mock's per-call expectation style is
//! more friction than it's worth.

use std::collections::HashMap;

use mockall::mock;
use ooocore::common::ids::ThreadId;
use ooocore::common::{PhysAddr, TranslationResult, VirtAddr};
use ooocore::core::pipeline::traits::{
    BasicBlock, BasicBlockCache, BranchKind, BranchPredictor, HostContext, MemRequestTag,
    MemoryHierarchy, PredictionHandle,
};

mock! {
    pub Host {}
    impl HostContext for Host {
        fn read_arch_gpr(&self, thread: ThreadId, index: u8) -> u64;
        fn write_arch_gpr(&mut self, thread: ThreadId, index: u8, value: u64);
        fn read_arch_rip(&self, thread: ThreadId) -> VirtAddr;
        fn write_arch_rip(&mut self, thread: ThreadId, rip: VirtAddr);
        fn translate(&mut self, thread: ThreadId, vaddr: VirtAddr, for_write: bool) -> TranslationResult;
    }
}

mock! {
    pub Memory {}
    impl MemoryHierarchy for Memory {
        fn request_load(&mut self, thread: ThreadId, paddr: PhysAddr, bytes: u8) -> MemRequestTag;
        fn request_store(&mut self, thread: ThreadId, paddr: PhysAddr, bytes: u8, data: u64);
        fn request_pte_fetch(&mut self, thread: ThreadId, vaddr: VirtAddr, level: u8) -> MemRequestTag;
        fn poll(&mut self) -> Vec<MemRequestTag>;
    }
}

mock! {
    pub Predictor {}
    impl BranchPredictor for Predictor {
        fn init(&mut self, thread: ThreadId);
        fn predict(&mut self, thread: ThreadId, handle: PredictionHandle, kind: BranchKind, rip_after: VirtAddr) -> VirtAddr;
        fn update_ras(&mut self, thread: ThreadId, handle: PredictionHandle, rip_after: VirtAddr);
        fn annul_ras(&mut self, thread: ThreadId, handle: PredictionHandle);
        fn update(&mut self, thread: ThreadId, handle: PredictionHandle, rip_after: VirtAddr, actual_target: VirtAddr);
    }
}

/// A trivial `HostContext` backing store: all registers initialized to
/// zero, `rip` settable at construction. Most `Core` tests don't care about
/// per-call expectations the way a `mockall` mock demands, so this is
/// simpler than `MockHost` for the common case.
pub struct FakeHost {
    pub gprs: [u64; 16],
    pub rip: VirtAddr,
}

impl FakeHost {
    #[must_use]
    pub fn at(rip: VirtAddr) -> Self {
        Self { gprs: [0; 16], rip }
    }
}

impl HostContext for FakeHost {
    fn read_arch_gpr(&self, _thread: ThreadId, index: u8) -> u64 {
        self.gprs.get(index as usize).copied().unwrap_or(0)
    }
    fn write_arch_gpr(&mut self, _thread: ThreadId, index: u8, value: u64) {
        if let Some(slot) = self.gprs.get_mut(index as usize) {
            *slot = value;
        }
    }
    fn read_arch_rip(&self, _thread: ThreadId) -> VirtAddr {
        self.rip
    }
    fn write_arch_rip(&mut self, _thread: ThreadId, rip: VirtAddr) {
        self.rip = rip;
    }
    fn translate(&mut self, _thread: ThreadId, vaddr: VirtAddr, _for_write: bool) -> TranslationResult {
        TranslationResult::success(PhysAddr(vaddr.val()), 1)
    }
}

/// A block cache backed by a plain map, populated directly by the test
/// instead of going through a decoder.
#[derive(Default)]
pub struct FakeBlockCache {
    blocks: HashMap<u64, BasicBlock>,
}

impl FakeBlockCache {
    pub fn insert(&mut self, block: BasicBlock) {
        let _ = self.blocks.insert(block.start_rip.val(), block);
    }
}

impl BasicBlockCache for FakeBlockCache {
    fn lookup(&self, rip: VirtAddr) -> Option<&BasicBlock> {
        self.blocks.get(&rip.val())
    }
    fn invalidate_range(&mut self, start: VirtAddr, len: u64) {
        self.blocks.retain(|&addr, _| addr < start.val() || addr >= start.val() + len);
    }
}

/// A no-op memory hierarchy: every request is satisfied instantly and never
/// surfaces a completion, which is fine for tests that never issue loads.
#[derive(Default)]
pub struct FakeMemory {
    next_tag: u64,
}

impl MemoryHierarchy for FakeMemory {
    fn request_load(&mut self, _thread: ThreadId, _paddr: PhysAddr, _bytes: u8) -> MemRequestTag {
        self.next_tag += 1;
        MemRequestTag(self.next_tag)
    }
    fn request_store(&mut self, _thread: ThreadId, _paddr: PhysAddr, _bytes: u8, _data: u64) {}
    fn request_pte_fetch(&mut self, _thread: ThreadId, _vaddr: VirtAddr, _level: u8) -> MemRequestTag {
        self.next_tag += 1;
        MemRequestTag(self.next_tag)
    }
    fn poll(&mut self) -> Vec<MemRequestTag> {
        Vec::new()
    }
}

/// A predictor that always predicts fallthrough and records nothing.
#[derive(Default)]
pub struct FakePredictor;

impl BranchPredictor for FakePredictor {
    fn init(&mut self, _thread: ThreadId) {}
    fn predict(&mut self, _thread: ThreadId, _handle: PredictionHandle, _kind: BranchKind, rip_after: VirtAddr) -> VirtAddr {
        rip_after
    }
    fn update_ras(&mut self, _thread: ThreadId, _handle: PredictionHandle, _rip_after: VirtAddr) {}
    fn annul_ras(&mut self, _thread: ThreadId, _handle: PredictionHandle) {}
    fn update(&mut self, _thread: ThreadId, _handle: PredictionHandle, _rip_after: VirtAddr, _actual_target: VirtAddr) {}
}
