//! Core processor implementation.
//!
//! This module contains the out-of-order core: the shared PRFs and issue
//! queues, the per-thread contexts, and the orchestrator (`run_cycle`) that
//! advances the whole machine by exactly one simulated cycle.

use tracing::{debug, trace};

use crate::common::ids::{ClusterId, ThreadId};
use crate::common::VirtAddr;
use crate::config::Config;
use crate::core::pipeline::cluster::{select_cluster, ClusterTopology};
use crate::core::pipeline::commit::{commit_one, CommitContext};
use crate::core::pipeline::fetch::UnalignedPredictor;
use crate::core::pipeline::flush::{annul_after, full_pipeline_flush};
use crate::core::pipeline::interlock::{InterlockBuffer, LockOwner};
use crate::core::pipeline::iq::{IqTag, IssueQueue};
use crate::core::pipeline::lsq::ForwardResult;
use crate::core::pipeline::prf::{PhysicalRegisterFile, PrState};
use crate::core::pipeline::rob::{OperandRefs, Rob, RobIdx, RobState};
use crate::core::pipeline::smt::{icount_fetch_order, RoundRobin};
use crate::core::pipeline::thread::ThreadContext;
use crate::core::pipeline::traits::{
    BasicBlockCache, BranchKind, BranchPredictor, CommitOutcome, HostContext, MemoryHierarchy,
    PredictionHandle, RunCycleResult,
};
use crate::core::pipeline::uop::{OpClass, UopResult};

/// Instruction pipeline implementation (uop, PRF, ROB, LSQ, IQ, and stages).
pub mod pipeline;

/// One out-of-order core, owning every thread context plus the structures
/// shared across SMT siblings: the physical register file, per-cluster
/// issue queues, functional-unit availability, and the interlock buffer
/// (`§2`).
pub struct Core {
    config: Config,
    threads: Vec<ThreadContext>,
    prf: PhysicalRegisterFile,
    iqs: Vec<IssueQueue>,
    topology: ClusterTopology,
    interlock: InterlockBuffer,
    unaligned: UnalignedPredictor,
    round_robin: RoundRobin,
    /// Functional units still free this cycle, indexed by cluster (`§4.4`).
    /// Decremented when a uop is marked `Issued`, incremented when it clocks
    /// out of `Issued` at `do_complete` (or is annulled mid-latency).
    fu_avail: Vec<u32>,
    cycle: u64,
}

impl Core {
    /// Builds a core from a validated configuration and host-supplied
    /// starting `rip`s, one per thread.
    pub fn new(config: Config, start_rips: &[VirtAddr]) -> Result<Self, crate::common::ConfigError> {
        config.validate()?;
        let thread_count = config.smt.thread_count;
        assert_eq!(start_rips.len(), thread_count as usize);

        let threads = start_rips
            .iter()
            .enumerate()
            .map(|(i, &rip)| {
                ThreadContext::new(
                    ThreadId(i as u8),
                    config.queues.rob_size,
                    config.queues.ldq_size,
                    config.queues.stq_size,
                    config.queues.fetch_queue_size,
                    rip,
                )
            })
            .collect();

        let iqs = (0..config.cluster.cluster_count)
            .map(|_| IssueQueue::new(config.queues.issue_queue_size, thread_count))
            .collect();

        // Every op class is routed to every cluster absent a finer-grained
        // policy; a richer `executable_on_cluster` table is a host concern
        // once real opcode decode is wired in.
        let executable = [
            OpClass::IntAlu,
            OpClass::IntMulDiv,
            OpClass::Load,
            OpClass::Store,
            OpClass::Branch,
            OpClass::FpVector,
            OpClass::Fence,
            OpClass::Nop,
            OpClass::Microcode,
        ]
        .into_iter()
        .map(|c| (c, (1u32 << config.cluster.cluster_count) - 1))
        .collect();

        let fu_avail = vec![config.cluster.fu_count_per_cluster; config.cluster.cluster_count as usize];

        Ok(Self {
            prf: PhysicalRegisterFile::new(config.queues.phys_reg_file_size),
            iqs,
            topology: ClusterTopology::new(
                config.cluster.cluster_count,
                executable,
                config.cluster.latency_matrix(),
            ),
            interlock: InterlockBuffer::new(64),
            unaligned: UnalignedPredictor::new(u64::from(config.core.unaligned_predictor_size)),
            round_robin: RoundRobin::new(thread_count as u8),
            fu_avail,
            threads,
            config,
            cycle: 0,
        })
    }

    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    #[must_use]
    pub fn thread(&self, id: ThreadId) -> &ThreadContext {
        &self.threads[id.0 as usize]
    }

    #[must_use]
    pub fn prf(&self) -> &PhysicalRegisterFile {
        &self.prf
    }

    /// Advances the core by exactly one cycle, in the order `§2` fixes:
    /// commit, writeback, transfer, issue (per cluster), complete (per
    /// cluster), dispatch, frontend delay, rename, fetch (in priority
    /// order), deadlock-watchdog tick, advance round-robin.
    pub fn run_cycle(
        &mut self,
        host: &mut dyn HostContext,
        memory: &mut dyn MemoryHierarchy,
        blocks: &dyn BasicBlockCache,
        predictor: &mut dyn BranchPredictor,
    ) -> RunCycleResult {
        self.cycle += 1;
        trace!(cycle = self.cycle, "run_cycle start");

        let mut result = RunCycleResult::default();
        let thread_count = self.threads.len();
        let mut committed_flags = vec![false; thread_count];
        let mut dispatched_flags = vec![false; thread_count];

        self.do_commit(host, &mut result, &mut committed_flags);
        self.do_writeback();
        self.do_transfer_and_forward();
        self.do_issue(host, memory, predictor);
        self.do_complete();
        self.do_dispatch(&mut dispatched_flags);
        self.do_frontend_delay();
        self.do_rename();
        self.do_fetch(host, memory, blocks, predictor);

        for i in 0..thread_count {
            self.threads[i].deadlock.tick(committed_flags[i], dispatched_flags[i]);
            let tid = ThreadId(i as u8);
            if !self.threads[i].halted
                && self
                    .threads[i]
                    .deadlock
                    .needs_selective_flush(self.config.smt.dispatch_deadlock_countdown)
            {
                debug!(thread = %tid, "selective flush: dispatch deadlock countdown expired");
                self.release_thread_resources(tid);
                full_pipeline_flush(&mut self.threads[i], &mut self.prf, &mut self.interlock, host);
            }
            if self
                .threads[i]
                .deadlock
                .is_hard_deadlock(thread_count as u32, self.config.smt.commit_deadlock_cycles_per_thread)
            {
                result.hard_deadlock = true;
            }
        }

        self.prf.cleanup();
        self.round_robin.advance();
        trace!(cycle = self.cycle, committed = result.committed_uops, "run_cycle end");
        result
    }

    /// Releases every resource a full or selective flush of `thread_id` must
    /// reclaim before the ROB itself is wiped: each cluster's IQ slots and
    /// the functional units held by any entry still mid-latency in `Issued`.
    fn release_thread_resources(&mut self, thread_id: ThreadId) {
        let mut freed_fu = Vec::new();
        self.threads[thread_id.0 as usize].rob.for_each(|e| {
            if let RobState::Issued(c) = e.state {
                freed_fu.push(c);
            }
        });
        for c in freed_fu {
            self.fu_avail[c.0 as usize] += 1;
        }
        for iq in &mut self.iqs {
            iq.release_thread(thread_id);
        }
    }

    fn do_commit(&mut self, host: &mut dyn HostContext, result: &mut RunCycleResult, committed_flags: &mut [bool]) {
        let width = self.config.widths.commit_width;
        for (t_i, thread) in self.threads.iter_mut().enumerate() {
            if thread.halted {
                continue;
            }
            let mut committed_this_thread = 0;
            let macro_ops_before = thread.committed_macro_ops;
            for _ in 0..width {
                let mut ctx = CommitContext {
                    prf: &mut self.prf,
                    interlock: &mut self.interlock,
                };
                match commit_one(thread, &mut ctx) {
                    Some(CommitOutcome::Ok) => {
                        committed_this_thread += 1;
                        result.committed_uops += 1;
                    }
                    Some(outcome @ (CommitOutcome::Exception(_) | CommitOutcome::Stop)) => {
                        debug!(thread = %thread.id, ?outcome, "committing thread halted");
                        thread.halted = true;
                        result.outcome = Some(outcome);
                        let tid = thread.id;
                        let mut freed_fu = Vec::new();
                        thread.rob.for_each(|e| {
                            if let RobState::Issued(c) = e.state {
                                freed_fu.push(c);
                            }
                        });
                        for c in freed_fu {
                            self.fu_avail[c.0 as usize] += 1;
                        }
                        for iq in &mut self.iqs {
                            iq.release_thread(tid);
                        }
                        full_pipeline_flush(thread, &mut self.prf, &mut self.interlock, host);
                        break;
                    }
                    Some(other) => {
                        result.outcome = Some(other);
                        break;
                    }
                    None => break,
                }
            }
            result.committed_macro_ops += (thread.committed_macro_ops - macro_ops_before) as u32;
            committed_flags[t_i] = committed_this_thread > 0;
        }
    }

    fn do_writeback(&mut self) {
        let width = self.config.widths.writeback_width;
        for thread in &mut self.threads {
            let mut done = 0u32;
            let ready: Vec<_> = {
                let mut v = Vec::new();
                thread.rob.scan(RobState::ReadyToWriteback, |e| v.push(e.idx));
                v
            };
            for idx in ready {
                if done >= width {
                    break;
                }
                if let Some(pr) = thread.rob.get(idx).physreg {
                    self.prf.writeback(pr);
                }
                thread.rob.get_mut(idx).state = RobState::ReadyToCommit;
                done += 1;
            }
        }
    }

    /// Clocks the cross-cluster bypass delay on every `Completed` entry;
    /// once `forward_cycle` reaches `max_forwarding_latency` the result has
    /// finished propagating and the entry may writeback (`§4.4`).
    fn do_transfer_and_forward(&mut self) {
        for thread in &mut self.threads {
            let completed: Vec<_> = {
                let mut v = Vec::new();
                thread.rob.for_each(|e| {
                    if matches!(e.state, RobState::Completed(_)) {
                        v.push((e.idx, e.forward_cycle));
                    }
                });
                v
            };
            for (idx, forward_cycle) in completed {
                let entry = thread.rob.get_mut(idx);
                entry.forward_cycle += 1;
                if forward_cycle >= self.config.cluster.max_forwarding_latency {
                    entry.state = RobState::ReadyToWriteback;
                }
            }
        }
    }

    /// Issues ready uops out of each cluster's queue, up to `max_issue_width`
    /// per cluster, and resolves the memory/branch side effects `§4.5`/`§4.7`
    /// require at issue rather than at a later stage: DTLB/ITLB translation,
    /// store-to-load forwarding, locked-region acquisition, and mispredict
    /// detection. A functional unit is held for the rest of this uop's
    /// latency (`§4.4`); `do_complete` releases it.
    fn do_issue(&mut self, host: &mut dyn HostContext, memory: &mut dyn MemoryHierarchy, predictor: &mut dyn BranchPredictor) {
        // Wake any load whose outstanding memory request has completed: put
        // its ROB entry back on the issue-ready list so it retries through
        // the normal selection loop below.
        for tag in memory.poll() {
            for thread in &mut self.threads {
                if let Some(lsq_idx) = thread.lsq.take_completed(tag.0) {
                    let rob_idx = thread.lsq.get(lsq_idx).owning_rob;
                    if let RobState::CacheMiss(cluster) = thread.rob.get(rob_idx).state {
                        thread.rob.get_mut(rob_idx).state = RobState::ReadyToIssue(cluster);
                        let iqtag = IqTag::new(thread.id, rob_idx);
                        let _ = self.iqs[cluster.0 as usize].insert(iqtag, [None; 4], [true; 4]);
                    }
                    break;
                }
            }
        }

        let issue_width = self.config.widths.max_issue_width;
        let mut mispredicts: Vec<(ThreadId, RobIdx, VirtAddr)> = Vec::new();

        for cluster_idx in 0..self.iqs.len() {
            let cluster = ClusterId(cluster_idx as u8);
            for _ in 0..issue_width {
                let Some((slot, tag)) = self.iqs[cluster_idx].issue() else {
                    break;
                };
                let thread_idx = tag.thread().0 as usize;
                let idx = tag.rob_idx();

                let Some(uop) = self.threads[thread_idx].rob.get(idx).uop.clone() else {
                    self.iqs[cluster_idx].release(slot);
                    continue;
                };

                if uop.op_class.is_memory() && older_fence_pending(&self.threads[thread_idx].rob, idx) {
                    self.iqs[cluster_idx].replay(slot);
                    continue;
                }
                if self.fu_avail[cluster_idx] == 0 {
                    self.iqs[cluster_idx].replay(slot);
                    continue;
                }

                let operands = self.threads[thread_idx].rob.get(idx).operands;
                let mut values = [0u64; 4];
                for (i, src) in operands.srcs.iter().enumerate() {
                    if let Some(pr) = src {
                        values[i] = self.prf.get(*pr).data;
                    }
                }

                match uop.op_class {
                    OpClass::Load => {
                        let translation = host.translate(tag.thread(), VirtAddr(values[0]), false);
                        if let Some(trap) = translation.trap {
                            self.mark_issued(thread_idx, idx, cluster, UopResult::faulted(trap));
                            self.iqs[cluster_idx].release(slot);
                            continue;
                        }
                        let paddr = translation.paddr;
                        if uop.is_locked_load {
                            let owner = LockOwner { thread: tag.thread(), rob: idx };
                            if !self.interlock.try_acquire(paddr, owner) {
                                self.iqs[cluster_idx].replay(slot);
                                continue;
                            }
                        }
                        if let Some(lsq_idx) = self.threads[thread_idx].rob.get(idx).lsq {
                            self.threads[thread_idx].lsq.set_addr(lsq_idx, paddr, 0xFF);
                            match self.threads[thread_idx].lsq.forward_load(lsq_idx, paddr, 0xFF) {
                                ForwardResult::Stall => {
                                    self.iqs[cluster_idx].replay(slot);
                                    continue;
                                }
                                ForwardResult::Miss => {
                                    let req = memory.request_load(tag.thread(), paddr, 8);
                                    self.threads[thread_idx].lsq.get_mut(lsq_idx).mbtag = Some(req.0);
                                    self.threads[thread_idx].rob.get_mut(idx).state = RobState::CacheMiss(cluster);
                                    self.iqs[cluster_idx].release(slot);
                                    continue;
                                }
                                ForwardResult::Hit(_) => {}
                            }
                        }
                        let exec_result = (uop.exec)(&values);
                        self.mark_issued(thread_idx, idx, cluster, exec_result);
                        self.iqs[cluster_idx].release(slot);
                    }
                    OpClass::Store => {
                        let translation = host.translate(tag.thread(), VirtAddr(values[0]), true);
                        if let Some(trap) = translation.trap {
                            self.mark_issued(thread_idx, idx, cluster, UopResult::faulted(trap));
                            self.iqs[cluster_idx].release(slot);
                            continue;
                        }
                        if let Some(lsq_idx) = self.threads[thread_idx].rob.get(idx).lsq {
                            self.threads[thread_idx].lsq.set_addr(lsq_idx, translation.paddr, 0xFF);
                            self.threads[thread_idx].lsq.set_data(lsq_idx, values[1]);
                        }
                        let exec_result = (uop.exec)(&values);
                        self.mark_issued(thread_idx, idx, cluster, exec_result);
                        self.iqs[cluster_idx].release(slot);
                    }
                    OpClass::Branch => {
                        let exec_result = (uop.exec)(&values);
                        let actual_target = VirtAddr(exec_result.value);
                        let fallthrough = VirtAddr(uop.rip.val() + u64::from(uop.macro_op_bytes));
                        let predicted = uop.predicted_target.unwrap_or(fallthrough);
                        predictor.update(tag.thread(), PredictionHandle(uop.fetch_uuid), fallthrough, actual_target);
                        if predicted != actual_target {
                            mispredicts.push((tag.thread(), idx, actual_target));
                        }
                        self.mark_issued(thread_idx, idx, cluster, exec_result);
                        self.iqs[cluster_idx].release(slot);
                    }
                    _ => {
                        let exec_result = (uop.exec)(&values);
                        self.mark_issued(thread_idx, idx, cluster, exec_result);
                        self.iqs[cluster_idx].release(slot);
                    }
                }
            }
        }

        for (thread_id, branch_idx, actual_target) in mispredicts {
            let t_i = thread_id.0 as usize;
            let doomed = self.threads[t_i].rob.indices_after(branch_idx);
            for doomed_idx in doomed {
                let state = self.threads[t_i].rob.get(doomed_idx).state;
                if let Some(c) = state.cluster() {
                    let doomed_tag = IqTag::new(thread_id, doomed_idx);
                    if let Some(doomed_slot) = self.iqs[c.0 as usize].find_slot(doomed_tag) {
                        self.iqs[c.0 as usize].annul(doomed_slot);
                    }
                    if matches!(state, RobState::Issued(_)) {
                        self.fu_avail[c.0 as usize] += 1;
                    }
                }
            }
            annul_after(&mut self.threads[t_i], branch_idx, &mut self.prf, &mut self.interlock);
            self.threads[t_i].rip = actual_target;
            self.threads[t_i].fetch_offset = 0;
        }
    }

    /// Parks `idx`'s result until its functional-unit latency elapses,
    /// consuming one FU slot in `cluster` for the duration.
    fn mark_issued(&mut self, thread_idx: usize, idx: RobIdx, cluster: ClusterId, result: UopResult) {
        self.fu_avail[cluster.0 as usize] = self.fu_avail[cluster.0 as usize].saturating_sub(1);
        let op_class = self.threads[thread_idx]
            .rob
            .get(idx)
            .uop
            .as_ref()
            .map_or(OpClass::Nop, |u| u.op_class);
        let entry = self.threads[thread_idx].rob.get_mut(idx);
        entry.trap = result.trap;
        entry.pending_result = Some(result);
        entry.state = RobState::Issued(cluster);
        entry.cycles_left = fu_latency(op_class);
        entry.issued = true;
    }

    /// Clocks down every `Issued` entry's functional-unit latency; once it
    /// reaches zero the held result is applied to the PRF and the entry
    /// moves to `Completed`, releasing its FU (`§4.4`).
    fn do_complete(&mut self) {
        for thread in &mut self.threads {
            let issued: Vec<_> = {
                let mut v = Vec::new();
                thread.rob.for_each(|e| {
                    if let RobState::Issued(c) = e.state {
                        v.push((e.idx, c, e.cycles_left));
                    }
                });
                v
            };
            for (idx, cluster, cycles_left) in issued {
                if cycles_left > 0 {
                    thread.rob.get_mut(idx).cycles_left -= 1;
                    continue;
                }
                let entry = thread.rob.get_mut(idx);
                let result = entry.pending_result.take().unwrap_or_default();
                if let Some(pr) = entry.physreg {
                    self.prf.complete(pr, result.value, result.flags_zf);
                }
                entry.state = RobState::Completed(cluster);
                self.fu_avail[cluster.0 as usize] += 1;

                let tag = IqTag::new(thread.id, idx);
                for iq in &mut self.iqs {
                    iq.broadcast(tag);
                }
            }
        }
    }

    /// Dispatches `ready_to_dispatch` entries into a legal cluster's issue
    /// queue, computing each operand's real wakeup tag from the producing
    /// physical register's state rather than assuming every operand is
    /// preready (`§4.3`/`§4.4`).
    fn do_dispatch(&mut self, dispatched_flags: &mut [bool]) {
        let dispatch_width = self.config.widths.dispatch_width;
        for (t_i, thread) in self.threads.iter_mut().enumerate() {
            let ready: Vec<_> = {
                let mut v = Vec::new();
                thread.rob.scan(RobState::ReadyToDispatch, |e| v.push(e.idx));
                v
            };
            let mut dispatched = 0u32;
            for idx in ready {
                if dispatched >= dispatch_width {
                    break;
                }
                let Some(uop) = thread.rob.get(idx).uop.clone() else {
                    continue;
                };
                let legal = self.topology.executable_mask(uop.op_class);
                let mut free_mask = 0u32;
                for (i, iq) in self.iqs.iter().enumerate() {
                    if iq.has_room_for(thread.id) {
                        free_mask |= 1 << i;
                    }
                }

                let operands = thread.rob.get(idx).operands;
                let mut operand_tags: [Option<IqTag>; 4] = [None; 4];
                let mut preready = [true; 4];
                let mut producer_clusters: Vec<ClusterId> = Vec::new();
                for i in 0..4 {
                    let Some(pr) = operands.srcs[i] else {
                        continue;
                    };
                    let reg = self.prf.get(pr);
                    if reg.state == PrState::Waiting {
                        preready[i] = false;
                        if let (Some(owner_rob), Some(owner_thread)) = (reg.owning_rob, reg.thread_owner) {
                            operand_tags[i] = Some(IqTag::new(owner_thread, owner_rob));
                        }
                    } else if let Some(owner_rob) = reg.owning_rob {
                        if let Some(c) = thread.rob.get(owner_rob).state.cluster() {
                            producer_clusters.push(c);
                        }
                    }
                }

                let Some(cluster) = select_cluster(legal & free_mask, &producer_clusters) else {
                    continue;
                };
                let tag = IqTag::new(thread.id, idx);
                if self.iqs[cluster.0 as usize].insert(tag, operand_tags, preready).is_some() {
                    thread.rob.get_mut(idx).state = RobState::ReadyToIssue(cluster);
                    dispatched += 1;
                }
            }
            dispatched_flags[t_i] = dispatched > 0;
        }
    }

    fn do_frontend_delay(&mut self) {
        for thread in &mut self.threads {
            let frontend: Vec<_> = {
                let mut v = Vec::new();
                thread.rob.scan(RobState::Frontend, |e| v.push(e.idx));
                v
            };
            for idx in frontend {
                let entry = thread.rob.get_mut(idx);
                if entry.cycles_left == 0 {
                    entry.state = RobState::ReadyToDispatch;
                } else {
                    entry.cycles_left -= 1;
                }
            }
        }
    }

    /// Renames up to `frontend_width` uops per thread per cycle, allocating
    /// a destination PR and (for `Load`/`Store`) an LSQ entry for each; a
    /// resource stall breaks the per-thread loop rather than skipping to the
    /// next uop, since renaming out of program order would reorder operand
    /// bindings (`§4.3`).
    fn do_rename(&mut self) {
        let width = self.config.widths.frontend_width;
        for thread in &mut self.threads {
            for _ in 0..width {
                if thread.rob.is_full() {
                    break;
                }
                let Some(uop) = thread.fetchq.front().cloned() else {
                    break;
                };
                if uop.dst_reg.is_some() && self.prf.free_count() == 0 {
                    break;
                }
                let is_memory = uop.op_class.is_memory();
                let is_store = uop.op_class == OpClass::Store;
                if is_memory && !thread.lsq.has_room_for(is_store) {
                    break;
                }
                let dst_reg = uop.dst_reg;
                let src_regs = uop.src_regs;
                let Some(idx) = thread.rob.allocate(uop) else {
                    break;
                };
                let _ = thread.fetchq.pop();

                let mut operands = OperandRefs::default();
                for (i, src) in src_regs.iter().enumerate() {
                    if let Some(reg) = src {
                        let pr = thread.rrt.spec.get(*reg);
                        self.prf.incref(pr);
                        operands.srcs[i] = Some(pr);
                    }
                }

                if let Some(dst) = dst_reg {
                    if let Some(pr) = self.prf.alloc(thread.id, idx) {
                        let old = thread.rrt.spec.get(dst);
                        operands.old_dst = Some(old);
                        self.prf.incref(old);
                        thread.rrt.spec.set(dst, pr);
                        thread.rob.get_mut(idx).physreg = Some(pr);
                    }
                }

                if is_memory {
                    if let Some(lsq_idx) = thread.lsq.allocate(idx, is_store) {
                        thread.rob.get_mut(idx).lsq = Some(lsq_idx);
                    }
                }

                let entry = thread.rob.get_mut(idx);
                entry.operands = operands;
                entry.cycles_left = self.config.widths.frontend_stages;
                entry.state = RobState::Frontend;
            }
        }
    }

    /// Fetches up to `fetch_width` uops per thread, in ICOUNT priority
    /// order, resuming mid-block from `thread.fetch_offset` when a previous
    /// cycle's width cap left a basic block partially consumed. Probes the
    /// ITLB via `host.translate`, consults the unaligned predictor, and
    /// installs a branch prediction for `Branch` uops before they enter the
    /// fetch queue (`§4.1`, `§4.7`).
    fn do_fetch(
        &mut self,
        host: &mut dyn HostContext,
        _memory: &mut dyn MemoryHierarchy,
        blocks: &dyn BasicBlockCache,
        predictor: &mut dyn BranchPredictor,
    ) {
        let fetch_width = self.config.widths.fetch_width;
        let in_flight: Vec<u32> = self.threads.iter().map(ThreadContext::in_flight_uops).collect();
        let order = icount_fetch_order(&in_flight);

        for thread_id in order {
            let t_i = thread_id.0 as usize;
            if self.threads[t_i].halted || self.threads[t_i].fetchq.is_full() {
                continue;
            }
            let rip = self.threads[t_i].rip;
            let translation = host.translate(thread_id, rip, false);
            if translation.trap.is_some() {
                // ITLB miss: fetch stalls this thread for the cycle. The
                // host's own page-walk timing is opaque beyond this call.
                continue;
            }
            let Some(block) = blocks.lookup(rip) else {
                continue;
            };

            let offset = self.threads[t_i].fetch_offset as usize;
            let mut consumed = offset;
            let mut fetched = 0u32;
            for uop in block.uops.iter().skip(offset) {
                if fetched >= fetch_width || self.threads[t_i].fetchq.is_full() {
                    break;
                }
                let mut u = uop.clone();
                let frame = u.rip.val() >> 12;
                if u.rip.crosses_boundary(4) {
                    self.unaligned.record_unaligned(u.rip, frame);
                }

                if u.op_class == OpClass::Branch {
                    let handle = PredictionHandle(self.threads[t_i].fetchq.next_fetch_uuid);
                    let predicted = predictor.predict(thread_id, handle, BranchKind::Conditional, block.fallthrough_rip);
                    u.predicted_target = Some(predicted);
                } else {
                    u.predicted_target = u.predicted_target.or(Some(block.fallthrough_rip));
                }

                let pushed = self.threads[t_i].fetchq.push(u);
                debug_assert!(pushed, "fetchq capacity was checked before pushing");
                consumed += 1;
                fetched += 1;
            }

            if consumed >= block.uops.len() {
                self.threads[t_i].rip = block.fallthrough_rip;
                self.threads[t_i].fetch_offset = 0;
            } else {
                self.threads[t_i].fetch_offset = consumed as u32;
            }
        }
    }
}

/// Per-cycle functional-unit latency by opcode class (`§4.4`); a host with a
/// richer functional-unit model can replace this with a table keyed on real
/// opcode identity, but class-level latency is the simulator's native grain.
fn fu_latency(class: OpClass) -> u32 {
    match class {
        OpClass::IntAlu | OpClass::Nop | OpClass::Fence | OpClass::Branch | OpClass::Microcode => 1,
        OpClass::IntMulDiv => 3,
        OpClass::Load | OpClass::Store => 2,
        OpClass::FpVector => 4,
    }
}

/// Whether an older, not-yet-`ReadyToCommit` fence uop blocks `idx` (a load
/// or store) from issuing ahead of it (`§4.5`'s fence-ordering rule).
fn older_fence_pending(rob: &Rob, idx: RobIdx) -> bool {
    let mut pending = false;
    let mut reached = false;
    rob.for_each(|e| {
        if reached {
            return;
        }
        if e.idx == idx {
            reached = true;
            return;
        }
        if let Some(uop) = &e.uop {
            if uop.op_class == OpClass::Fence && e.state != RobState::ReadyToCommit {
                pending = true;
            }
        }
    });
    pending
}
