//! In-order commit: retires `ready_to_commit` ROB entries in program order,
//! in macro-op atomic groups (`§4.6`).
//!
//! No uop of a macro-op commits until every uop from its SOM through its
//! EOM is ready-to-commit or carries an exception; the first faulting uop
//! in program order wins. This module implements the 8-step sequence of
//! `§4.6` against one thread at a time; the caller (`Core::run_cycle`)
//! invokes it up to `COMMIT_WIDTH` times per cycle.

use crate::common::Trap;
use crate::core::pipeline::interlock::{InterlockBuffer, LockOwner};
use crate::core::pipeline::lsq::Lsq;
use crate::core::pipeline::prf::PhysicalRegisterFile;
use crate::core::pipeline::rob::{Rob, RobEntry, RobState};
use crate::core::pipeline::thread::ThreadContext;
use crate::core::pipeline::traits::CommitOutcome;

/// Everything commit needs mutable access to beyond the thread's own state.
pub struct CommitContext<'a> {
    pub prf: &'a mut PhysicalRegisterFile,
    pub interlock: &'a mut InterlockBuffer,
}

/// Whether the macro-op containing `head`'s uop is complete enough to
/// commit: every uop from its SOM through its EOM must be `ReadyToCommit`,
/// unless one of them carries an architectural exception, in which case
/// the first such uop in program order is the one that actually faults.
fn macro_op_ready(rob: &Rob, head_idx: crate::core::pipeline::rob::RobIdx) -> MacroOpStatus {
    let mut idx = head_idx;
    loop {
        let entry = rob.get(idx);
        match &entry.uop {
            None => return MacroOpStatus::NotReady,
            Some(uop) => {
                if entry.state != RobState::ReadyToCommit {
                    return MacroOpStatus::NotReady;
                }
                if uop.eom {
                    return MacroOpStatus::Ready;
                }
            }
        }
        let cap = rob.capacity() as u32;
        let next = crate::core::pipeline::rob::RobIdx((idx.0 + 1) % cap);
        if rob.head_idx() == Some(next) {
            return MacroOpStatus::NotReady;
        }
        idx = next;
    }
}

enum MacroOpStatus {
    Ready,
    NotReady,
}

/// Commits exactly one ROB head entry, performing the `§4.6` 8-step
/// sequence. Returns `None` if the head is not ready to commit (including
/// mid-macro-op when a later uop hasn't finished).
pub fn commit_one(thread: &mut ThreadContext, ctx: &mut CommitContext<'_>) -> Option<CommitOutcome> {
    let head_idx = thread.rob.head_idx()?;

    if matches!(macro_op_ready(&thread.rob, head_idx), MacroOpStatus::NotReady) {
        return None;
    }

    // A store still waiting on a line locked by another thread's
    // outstanding RMW must stall here, before `commit_head` destructively
    // removes it — retiring it first would release its own interlock-held
    // resources with no way to put the entry back (`§4.6` step 2 addition).
    if let Some(lsq_idx) = thread.rob.get(head_idx).lsq {
        if let Some(paddr) = thread.lsq.get(lsq_idx).physaddr {
            let owner = LockOwner { thread: thread.id, rob: head_idx };
            if ctx.interlock.is_locked_by_other(paddr, owner) {
                return None;
            }
        }
    }

    let retired = thread.rob.commit_head()?;
    commit_retired_entry(thread, ctx, retired)
}

fn commit_retired_entry(
    thread: &mut ThreadContext,
    ctx: &mut CommitContext<'_>,
    entry: RobEntry,
) -> Option<CommitOutcome> {
    let uop = entry.uop.as_ref().expect("retired entry always carries a uop");

    // Step 1/2: exceptions, SMC, and barriers preempt normal retirement.
    let outcome = detect_outcome(&entry);
    let is_fault = matches!(
        outcome,
        CommitOutcome::Exception(_) | CommitOutcome::Smc | CommitOutcome::Barrier
    );

    // Step 3: commit the destination PR into the architectural rename table,
    // or release it unused if this uop faulted before producing a value.
    if let Some(pr) = entry.physreg {
        if !is_fault {
            if let Some(dst_reg) = uop.dst_reg {
                let old = thread.rrt.commit.get(dst_reg);
                ctx.prf.commit(pr, Some(old));
                thread.rrt.commit.set(dst_reg, pr);
            }
        } else {
            ctx.prf.decref(pr);
        }
    }

    // Step 4/5: release LSQ entry and any interlock it held.
    if let Some(lsq_idx) = entry.lsq {
        release_lsq_entry(&mut thread.lsq, lsq_idx, ctx.interlock, thread.id, head_idx_of(&entry));
    }

    // Step 6: drop this entry's operand references.
    for src in entry.operands.srcs.iter().flatten() {
        ctx.prf.decref(*src);
    }
    if let Some(old) = entry.operands.old_dst {
        ctx.prf.decref(old);
    }

    // Step 7: advance architectural rip on end-of-macro-op. A faulting
    // macro-op does not advance rip here; the host redirects via the next
    // full pipeline flush once it has handled the reported outcome.
    if uop.eom && !is_fault {
        thread.committed_macro_ops += 1;
        thread.rip = uop
            .predicted_target
            .unwrap_or(crate::common::VirtAddr(uop.rip.val() + u64::from(uop.macro_op_bytes)));
    }
    thread.committed_uops += 1;

    Some(outcome)
}

fn head_idx_of(entry: &RobEntry) -> crate::core::pipeline::rob::RobIdx {
    entry.idx
}

fn release_lsq_entry(
    lsq: &mut Lsq,
    idx: crate::core::pipeline::lsq::LsqIdx,
    interlock: &mut InterlockBuffer,
    thread: crate::common::ids::ThreadId,
    rob_idx: crate::core::pipeline::rob::RobIdx,
) {
    if let Some(paddr) = lsq.get(idx).physaddr {
        interlock.release(paddr, LockOwner { thread, rob: rob_idx });
    }
    lsq.release(idx);
}

fn detect_outcome(entry: &RobEntry) -> CommitOutcome {
    if let Some(trap) = entry.trap {
        return classify_trap(trap);
    }
    if entry.annul_flag {
        return CommitOutcome::None;
    }
    CommitOutcome::Ok
}

/// Classifies a trap observed during execution into the commit-time
/// taxonomy the host sees (`§7`).
#[must_use]
pub fn classify_trap(trap: Trap) -> CommitOutcome {
    if trap.is_architectural() {
        CommitOutcome::Exception(trap)
    } else {
        match trap {
            Trap::SelfModifyingCode => CommitOutcome::Smc,
            Trap::Barrier => CommitOutcome::Barrier,
            _ => CommitOutcome::None,
        }
    }
}
