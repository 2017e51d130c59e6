//! Full pipeline flush and mispredict annulment (`§4.8`).

use crate::common::ids::ThreadId;
use crate::core::pipeline::interlock::{InterlockBuffer, LockOwner};
use crate::core::pipeline::prf::PhysicalRegisterFile;
use crate::core::pipeline::rob::RobIdx;
use crate::core::pipeline::thread::ThreadContext;
use crate::core::pipeline::traits::HostContext;

/// Rebuilds `thread`'s architectural and speculative state entirely from
/// the host's register file: allocates one PR per architectural register
/// in `Arch` state and points both rename tables at them with matched
/// refcounts (`§4.8`'s `external_to_core_state`). Used on a full pipeline
/// flush — an exception, an interrupt, or any other event that discards
/// every in-flight uop. The caller must release this thread's slots from
/// every cluster's issue queue before calling this, since a slot's owning
/// cluster is not recoverable from the ROB entry alone once the uop is gone.
pub fn full_pipeline_flush(
    thread: &mut ThreadContext,
    prf: &mut PhysicalRegisterFile,
    interlock: &mut InterlockBuffer,
    host: &mut dyn HostContext,
) {
    // Walk forward through the ROB releasing each entry's resources before
    // the arena itself is cleared.
    thread.rob.for_each(|entry| {
        if let Some(pr) = entry.physreg {
            prf.decref(pr);
        }
        for src in entry.operands.srcs.iter().flatten() {
            prf.decref(*src);
        }
    });
    prf.reset_thread(thread.id);
    thread.rob.flush_all();
    thread.lsq.flush_all();
    thread.fetchq.flush();
    interlock.release_all_for(thread.id);

    thread.rrt.reset_to(|reg| {
        let value = if reg.is_flag_group() {
            0
        } else if reg == crate::common::ids::ArchReg::RIP {
            host.read_arch_rip(thread.id).val()
        } else {
            host.read_arch_gpr(thread.id, reg.0)
        };
        let pr = prf
            .alloc(thread.id, RobIdx(0))
            .expect("PRF must have enough registers for every architectural slot");
        prf.complete(pr, value, false);
        prf.writeback(pr);
        prf.commit(pr, None);
        pr
    });

    thread.rip = host.read_arch_rip(thread.id);
    thread.fetch_offset = 0;
    thread.deadlock = crate::core::pipeline::smt::DeadlockCounters::default();
}

/// Annuls every ROB entry strictly younger than `branch_eom` after a
/// mispredict discovered at issue or commit (`§4.8`).
///
/// Walks the to-be-removed range in reverse (youngest first), undoing each
/// entry's effect on the speculative rename table by "pseudo-committing" it
/// into a scratch table, then frees its PR, LSQ slot, and IQ slot. The
/// scratch table, once the walk finishes, holds the specRRT contents as of
/// just before the mispredicted uop and replaces the thread's live one.
pub fn annul_after(
    thread: &mut ThreadContext,
    branch_eom: RobIdx,
    prf: &mut PhysicalRegisterFile,
    interlock: &mut InterlockBuffer,
) {
    let mut scratch = thread.rrt.spec.clone();
    let doomed = thread.rob.indices_after(branch_eom);

    for idx in doomed.into_iter().rev() {
        let entry = thread.rob.get(idx).clone();
        if let Some(uop) = &entry.uop {
            if let (Some(dst), Some(old)) = (uop.dst_reg, entry.operands.old_dst) {
                scratch.set(dst, old);
            }
        }
        if let Some(pr) = entry.physreg {
            prf.decref(pr);
        }
        for src in entry.operands.srcs.iter().flatten() {
            prf.decref(*src);
        }
        if let Some(lsq_idx) = entry.lsq {
            if let Some(paddr) = thread.lsq.get(lsq_idx).physaddr {
                interlock.release(
                    paddr,
                    LockOwner {
                        thread: thread.id,
                        rob: idx,
                    },
                );
            }
            thread.lsq.release(lsq_idx);
        }
    }

    let cap = thread.rob.capacity() as u32;
    let first_removed = RobIdx((branch_eom.0 + 1) % cap);
    thread.rob.truncate_from_tail(first_removed);
    thread.rrt.spec.copy_from(&scratch);
    thread.fetchq.truncate_after(branch_eom.0 as u64);
}
