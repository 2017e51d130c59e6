//! Integration-style tests driving a whole `Core` through the external
//! traits it expects the host to supply.

use std::sync::Arc;

use mockall::predicate::eq;
use ooocore::common::ids::{ArchReg, ThreadId};
use ooocore::common::VirtAddr;
use ooocore::config::Config;
use ooocore::core::pipeline::traits::BasicBlock;
use ooocore::core::pipeline::uop::{OpClass, SetFlagsMask, Uop, UopResult};
use ooocore::core::pipeline::interlock::InterlockBuffer;
use ooocore::core::pipeline::prf::PhysicalRegisterFile;
use ooocore::core::pipeline::thread::ThreadContext;
use ooocore::core::pipeline::flush::full_pipeline_flush;
use ooocore::Core;
use pretty_assertions::assert_eq as passert_eq;
use proptest::prelude::*;
use rstest::rstest;

use crate::common::mocks::{FakeBlockCache, FakeHost, FakeMemory, FakePredictor, MockHost};

/// Runs `core` until `committed_macro_ops` for every thread reaches
/// `target`, or `max_cycles` elapses (whichever comes first), returning
/// whether the target was actually hit.
fn run_until_macro_ops(
    core: &mut Core,
    host: &mut dyn ooocore::core::pipeline::traits::HostContext,
    memory: &mut dyn ooocore::core::pipeline::traits::MemoryHierarchy,
    blocks: &FakeBlockCache,
    predictor: &mut dyn ooocore::core::pipeline::traits::BranchPredictor,
    thread_count: u8,
    target: u64,
    max_cycles: u32,
) -> bool {
    for _ in 0..max_cycles {
        let _ = core.run_cycle(host, memory, blocks, predictor);
        if (0..thread_count).all(|t| core.thread(ThreadId(t)).committed_macro_ops >= target) {
            return true;
        }
    }
    false
}

fn single_uop_block(rip: VirtAddr, dst: ArchReg) -> BasicBlock {
    let uop = Uop {
        op_class: OpClass::IntAlu,
        rip,
        macro_op_bytes: 4,
        fetch_uuid: 0,
        som: true,
        eom: true,
        src_regs: [None; 4],
        dst_reg: Some(dst),
        set_flags: SetFlagsMask::default(),
        is_locked_load: false,
        predicted_target: None,
        exec: Arc::new(|_| UopResult::ok(0xABCD)),
    };
    BasicBlock {
        start_rip: rip,
        byte_length: 4,
        uops: vec![uop],
        fallthrough_rip: VirtAddr(rip.val() + 4),
    }
}

#[test]
fn core_fetches_issues_and_commits_a_single_macro_op() {
    let mut config = Config::default();
    config.smt.thread_count = 1;
    let start = VirtAddr(0x1000);

    let mut core = Core::new(config, &[start]).expect("default config validates");

    let mut blocks = FakeBlockCache::default();
    blocks.insert(single_uop_block(start, ArchReg::RAX));

    let mut host = FakeHost::at(start);
    let mut memory = FakeMemory::default();
    let mut predictor = FakePredictor;

    let mut committed = 0;
    for _ in 0..32 {
        let result = core.run_cycle(&mut host, &mut memory, &blocks, &mut predictor);
        committed += result.committed_uops;
        if committed > 0 {
            break;
        }
    }

    assert!(committed > 0, "expected the single uop to retire within 32 cycles");
    assert_eq!(core.thread(ThreadId(0)).committed_macro_ops, 1);
}

#[test]
fn invalid_config_is_rejected_before_any_cycle_runs() {
    let mut config = Config::default();
    config.queues.rob_size = 0;
    assert!(Core::new(config, &[VirtAddr(0)]).is_err());
}

#[test]
fn full_pipeline_flush_reads_every_architectural_register_from_the_host() {
    let mut host = MockHost::new();
    let _ = host.expect_read_arch_rip().returning(|_| VirtAddr(0x2000));
    let _ = host
        .expect_read_arch_gpr()
        .with(eq(ThreadId(0)), eq(ArchReg::RAX.0))
        .returning(|_, _| 0x42);
    let _ = host
        .expect_read_arch_gpr()
        .withf(|_, index| *index != ArchReg::RAX.0)
        .returning(|_, _| 0);

    let mut thread = ThreadContext::new(ThreadId(0), 8, 8, 8, 8, VirtAddr(0));
    let mut prf = PhysicalRegisterFile::new(128);
    let mut interlock = InterlockBuffer::new(64);

    full_pipeline_flush(&mut thread, &mut prf, &mut interlock, &mut host);

    assert_eq!(thread.rip, VirtAddr(0x2000));
    let rax_pr = thread.rrt.commit.get(ArchReg::RAX);
    assert_eq!(prf.get(rax_pr).data, 0x42);
}

/// Builds one straight-line block out of `(dst, exec)` pairs plus explicit
/// source operands, each its own one-uop macro-op four bytes long.
fn alu_chain_block(
    rip: VirtAddr,
    uops: Vec<(Option<ArchReg>, [Option<ArchReg>; 4], Arc<dyn Fn(&[u64; 4]) -> UopResult + Send + Sync>)>,
) -> BasicBlock {
    let mut built = Vec::new();
    for (i, (dst, src_regs, exec)) in uops.into_iter().enumerate() {
        built.push(Uop {
            op_class: OpClass::IntAlu,
            rip: VirtAddr(rip.val() + (i as u64) * 4),
            macro_op_bytes: 4,
            fetch_uuid: 0,
            som: true,
            eom: true,
            src_regs,
            dst_reg: dst,
            set_flags: SetFlagsMask::default(),
            is_locked_load: false,
            predicted_target: None,
            exec,
        });
    }
    let byte_length = (built.len() as u32) * 4;
    BasicBlock {
        start_rip: rip,
        byte_length,
        uops: built,
        fallthrough_rip: VirtAddr(rip.val() + u64::from(byte_length)),
    }
}

#[test]
fn a_consumer_uop_wakes_on_its_producers_operand_tag() {
    // uop0 writes RAX := 7; uop1 reads RAX and writes RBX := RAX * 2. If the
    // dispatch-time operand/wakeup wiring were hardcoded to "always ready",
    // this would still pass by accident; what actually exercises the wakeup
    // path is that uop1 cannot issue until uop0's broadcast marks its tag
    // ready, which `run_until_macro_ops` below gives it time to observe.
    let mut config = Config::default();
    config.smt.thread_count = 1;
    let start = VirtAddr(0x1000);
    let mut core = Core::new(config, &[start]).expect("default config validates");

    let mut blocks = FakeBlockCache::default();
    blocks.insert(alu_chain_block(
        start,
        vec![
            (Some(ArchReg::RAX), [None; 4], Arc::new(|_| UopResult::ok(7))),
            (
                Some(ArchReg::gpr(1)),
                [Some(ArchReg::RAX), None, None, None],
                Arc::new(|v| UopResult::ok(v[0] * 2)),
            ),
        ],
    ));

    let mut host = FakeHost::at(start);
    let mut memory = FakeMemory::default();
    let mut predictor = FakePredictor;

    let reached = run_until_macro_ops(&mut core, &mut host, &mut memory, &blocks, &mut predictor, 1, 2, 64);
    assert!(reached, "both uops should retire within 64 cycles");

    let rbx_pr = core.thread(ThreadId(0)).rrt.commit.get(ArchReg::gpr(1));
    passert_eq!(core.prf().get(rbx_pr).data, 14);
}

#[test]
fn a_load_forwards_from_an_older_store_to_the_same_address_instead_of_missing_to_memory() {
    // Program order: RAX := addr, gpr(1) := data, store [RAX] <- gpr(1), gpr(2) := load [RAX].
    // `FakeMemory::poll` never reports a completion, so if the load actually
    // missed to memory instead of forwarding it would stall forever and
    // `committed_macro_ops` would wedge at 3, never reaching 4.
    let mut config = Config::default();
    config.smt.thread_count = 1;
    let start = VirtAddr(0x2000);
    let mut core = Core::new(config, &[start]).expect("default config validates");

    let mut built = alu_chain_block(
        start,
        vec![
            (Some(ArchReg::RAX), [None; 4], Arc::new(|_| UopResult::ok(0x4000))),
            (Some(ArchReg::gpr(1)), [None; 4], Arc::new(|_| UopResult::ok(0xCAFE))),
        ],
    );
    let store = Uop {
        op_class: OpClass::Store,
        rip: VirtAddr(start.val() + 8),
        macro_op_bytes: 4,
        fetch_uuid: 0,
        som: true,
        eom: true,
        src_regs: [Some(ArchReg::RAX), Some(ArchReg::gpr(1)), None, None],
        dst_reg: None,
        set_flags: SetFlagsMask::default(),
        is_locked_load: false,
        predicted_target: None,
        exec: Arc::new(|v| UopResult::ok(v[1])),
    };
    let load = Uop {
        op_class: OpClass::Load,
        rip: VirtAddr(start.val() + 12),
        macro_op_bytes: 4,
        fetch_uuid: 0,
        som: true,
        eom: true,
        src_regs: [Some(ArchReg::RAX), None, None, None],
        dst_reg: Some(ArchReg::gpr(2)),
        set_flags: SetFlagsMask::default(),
        is_locked_load: false,
        predicted_target: None,
        exec: Arc::new(|v| UopResult::ok(v[0])),
    };
    built.uops.push(store);
    built.uops.push(load);
    built.byte_length += 8;
    built.fallthrough_rip = VirtAddr(start.val() + 16);

    let mut blocks = FakeBlockCache::default();
    blocks.insert(built);

    let mut host = FakeHost::at(start);
    let mut memory = FakeMemory::default();
    let mut predictor = FakePredictor;

    let reached = run_until_macro_ops(&mut core, &mut host, &mut memory, &blocks, &mut predictor, 1, 4, 128);
    assert!(reached, "the load must forward rather than miss to a memory hierarchy that never completes");
}

#[test]
fn a_mispredicted_branch_annuls_the_wrong_path_and_redirects_to_the_real_target() {
    let mut config = Config::default();
    config.smt.thread_count = 1;
    let start = VirtAddr(0x1000);
    let wrong_path = VirtAddr(0x1004);
    let correct_target = VirtAddr(0x5000);

    let mut core = Core::new(config, &[start]).expect("default config validates");

    let branch = Uop {
        op_class: OpClass::Branch,
        rip: start,
        macro_op_bytes: 4,
        fetch_uuid: 0,
        som: true,
        eom: true,
        src_regs: [None; 4],
        dst_reg: None,
        set_flags: SetFlagsMask::default(),
        is_locked_load: false,
        predicted_target: None,
        exec: Arc::new(move |_| UopResult::ok(correct_target.val())),
    };
    let branch_block = BasicBlock {
        start_rip: start,
        byte_length: 4,
        uops: vec![branch],
        fallthrough_rip: wrong_path,
    };

    let mut blocks = FakeBlockCache::default();
    blocks.insert(branch_block);
    blocks.insert(alu_chain_block(
        wrong_path,
        vec![(Some(ArchReg::RAX), [None; 4], Arc::new(|_| UopResult::ok(0xBAD)))],
    ));
    blocks.insert(alu_chain_block(
        correct_target,
        vec![(Some(ArchReg::RAX), [None; 4], Arc::new(|_| UopResult::ok(0x600D)))],
    ));

    let mut host = FakeHost::at(start);
    let mut memory = FakeMemory::default();
    let mut predictor = FakePredictor; // always predicts fallthrough, so this branch always mispredicts

    let reached = run_until_macro_ops(&mut core, &mut host, &mut memory, &blocks, &mut predictor, 1, 2, 128);
    assert!(reached, "the branch and the correct-path uop should both retire");

    let rax_pr = core.thread(ThreadId(0)).rrt.commit.get(ArchReg::RAX);
    passert_eq!(
        core.prf().get(rax_pr).data,
        0x600D,
        "the wrong-path write must never have committed"
    );
}

#[test]
fn two_smt_threads_make_independent_forward_progress() {
    let mut config = Config::default();
    config.smt.thread_count = 2;
    let start0 = VirtAddr(0x1000);
    let start1 = VirtAddr(0x9000);

    let mut core = Core::new(config, &[start0, start1]).expect("default config validates");

    let mut blocks = FakeBlockCache::default();
    blocks.insert(alu_chain_block(
        start0,
        vec![(Some(ArchReg::RAX), [None; 4], Arc::new(|_| UopResult::ok(111)))],
    ));
    blocks.insert(alu_chain_block(
        start1,
        vec![(Some(ArchReg::gpr(1)), [None; 4], Arc::new(|_| UopResult::ok(222)))],
    ));

    let mut host = FakeHost::at(start0);
    let mut memory = FakeMemory::default();
    let mut predictor = FakePredictor;

    let reached = run_until_macro_ops(&mut core, &mut host, &mut memory, &blocks, &mut predictor, 2, 1, 64);
    assert!(reached, "both threads should each retire their one uop within 64 cycles");

    let rax_pr = core.thread(ThreadId(0)).rrt.commit.get(ArchReg::RAX);
    let rbx_pr = core.thread(ThreadId(1)).rrt.commit.get(ArchReg::gpr(1));
    passert_eq!(core.prf().get(rax_pr).data, 111);
    passert_eq!(core.prf().get(rbx_pr).data, 222);
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(4)]
fn independent_uop_chains_commit_regardless_of_dispatch_issue_width(#[case] width: u32) {
    let mut config = Config::default();
    config.smt.thread_count = 1;
    config.widths.dispatch_width = width;
    config.widths.max_issue_width = width;
    let start = VirtAddr(0x1000);
    let mut core = Core::new(config, &[start]).expect("default config validates");

    let mut blocks = FakeBlockCache::default();
    blocks.insert(alu_chain_block(
        start,
        vec![
            (Some(ArchReg::RAX), [None; 4], Arc::new(|_| UopResult::ok(1))),
            (Some(ArchReg::gpr(1)), [None; 4], Arc::new(|_| UopResult::ok(2))),
            (Some(ArchReg::gpr(2)), [None; 4], Arc::new(|_| UopResult::ok(3))),
        ],
    ));

    let mut host = FakeHost::at(start);
    let mut memory = FakeMemory::default();
    let mut predictor = FakePredictor;

    let reached = run_until_macro_ops(&mut core, &mut host, &mut memory, &blocks, &mut predictor, 1, 3, 128);
    assert!(reached, "width={width} should not drop or wedge independent uops");
}

proptest! {
    #[test]
    fn n_independent_alu_uops_all_eventually_commit_with_correct_values(n in 1usize..=6, seed in 0u64..1000) {
        let values: Vec<u64> = (0..n).map(|i| seed + (i as u64) * 31 + 1).collect();

        let mut config = Config::default();
        config.smt.thread_count = 1;
        let start = VirtAddr(0x1000);
        let mut core = Core::new(config, &[start]).expect("default config validates");

        let regs = [
            ArchReg::RAX, ArchReg::gpr(1), ArchReg::gpr(2), ArchReg::gpr(3),
            ArchReg::gpr(4), ArchReg::gpr(5),
        ];

        let mut blocks = FakeBlockCache::default();
        let chain = values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let exec: Arc<dyn Fn(&[u64; 4]) -> UopResult + Send + Sync> = Arc::new(move |_| UopResult::ok(v));
                (Some(regs[i]), [None; 4], exec)
            })
            .collect();
        blocks.insert(alu_chain_block(start, chain));

        let mut host = FakeHost::at(start);
        let mut memory = FakeMemory::default();
        let mut predictor = FakePredictor;

        let reached = run_until_macro_ops(&mut core, &mut host, &mut memory, &blocks, &mut predictor, 1, n as u64, 256);
        prop_assert!(reached, "{n} independent uops should all retire within 256 cycles");

        for (i, &v) in values.iter().enumerate() {
            let pr = core.thread(ThreadId(0)).rrt.commit.get(regs[i]);
            prop_assert_eq!(core.prf().get(pr).data, v);
        }
    }
}
