//! In-pipeline result taxonomy and host-facing construction errors.
//!
//! Two distinct vocabularies live here, matching the spec's own split:
//! [`Trap`] is *data* carried alongside a uop result, never unwound through
//! (`§7`, `§9` "exceptions for control flow"); [`ConfigError`] is an ordinary
//! `std::error::Error` returned by fallible construction, via `thiserror`.

use std::fmt;

use thiserror::Error;

use super::addr::VirtAddr;

/// The in-pipeline event taxonomy of `§7`.
///
/// A uop result carries an invalid-flag bit in parallel with its value bits;
/// `Trap` is what that bit names. Architectural exceptions propagate to
/// commit and cause the core to report [`crate::core::pipeline::CommitOutcome::Exception`].
/// Everything else here is consumed inside the core and never surfaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trap {
    /// Page fault on an instruction fetch.
    PageFaultExec(VirtAddr),
    /// Page fault on a load.
    PageFaultRead(VirtAddr),
    /// Page fault on a store.
    PageFaultWrite(VirtAddr),
    /// FP/vector unit not available to the requesting uop.
    FpNotAvailable,
    /// FP exception raised by the uop's execution function (invalid op,
    /// overflow, underflow, inexact, divide-by-zero).
    FpException,
    /// Integer divide overflow (signed divide whose quotient does not fit).
    DivideOverflow,
    /// Unaligned access the execution model does not permit.
    AlignmentFault(VirtAddr),

    /// Microcode check failed; redirect at commit rather than report upward.
    CheckFailed,
    /// Microcode requests the remainder of the current basic block be skipped.
    SkipBlock,

    /// Conditional or indirect branch resolved against a stale prediction.
    BranchMispredict,
    /// A load observed a value later found to violate memory ordering.
    OrderingViolation,
    /// A load's forwarding candidate partially overlapped its bytes; must replay.
    StoreForwardStall,
    /// DTLB miss; the uop is parked on the TLB-miss side list.
    TlbMiss,
    /// L1 miss; the uop is parked on the cache-miss side list.
    CacheMiss,
    /// A fence uop is blocking younger memory uops from issuing.
    FencePending,
    /// The uop's address falls in a cache line currently locked by another thread.
    LockedRegionConflict,

    /// Self-modifying-code write under a cached translation; out-of-band to the runtime.
    SelfModifyingCode,
    /// A barrier uop reached commit; out-of-band to the runtime.
    Barrier,
}

impl Trap {
    /// Whether this trap is one of the architectural exceptions that, once
    /// committed, cause the core to abandon the macro-op and report
    /// `EXCEPTION` to the runtime (`§7`, first bullet).
    #[must_use]
    pub fn is_architectural(&self) -> bool {
        matches!(
            self,
            Trap::PageFaultExec(_)
                | Trap::PageFaultRead(_)
                | Trap::PageFaultWrite(_)
                | Trap::FpNotAvailable
                | Trap::FpException
                | Trap::DivideOverflow
                | Trap::AlignmentFault(_)
        )
    }

    /// Whether this trap is a pipeline-internal event that never escapes the
    /// core: it drives redispatch, replay, or stall instead (`§7`, third bullet).
    #[must_use]
    pub fn is_pipeline_internal(&self) -> bool {
        matches!(
            self,
            Trap::BranchMispredict
                | Trap::OrderingViolation
                | Trap::StoreForwardStall
                | Trap::TlbMiss
                | Trap::CacheMiss
                | Trap::FencePending
                | Trap::LockedRegionConflict
        )
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trap::PageFaultExec(va) => write!(f, "page fault (exec) at {:#x}", va.val()),
            Trap::PageFaultRead(va) => write!(f, "page fault (read) at {:#x}", va.val()),
            Trap::PageFaultWrite(va) => write!(f, "page fault (write) at {:#x}", va.val()),
            Trap::FpNotAvailable => write!(f, "fp unit not available"),
            Trap::FpException => write!(f, "fp exception"),
            Trap::DivideOverflow => write!(f, "divide overflow"),
            Trap::AlignmentFault(va) => write!(f, "alignment fault at {:#x}", va.val()),
            Trap::CheckFailed => write!(f, "microcode check failed"),
            Trap::SkipBlock => write!(f, "microcode skip-block"),
            Trap::BranchMispredict => write!(f, "branch mispredict"),
            Trap::OrderingViolation => write!(f, "memory ordering violation"),
            Trap::StoreForwardStall => write!(f, "store-to-load forward stall"),
            Trap::TlbMiss => write!(f, "tlb miss"),
            Trap::CacheMiss => write!(f, "cache miss"),
            Trap::FencePending => write!(f, "fence pending"),
            Trap::LockedRegionConflict => write!(f, "locked region conflict"),
            Trap::SelfModifyingCode => write!(f, "self-modifying code"),
            Trap::Barrier => write!(f, "barrier"),
        }
    }
}

impl std::error::Error for Trap {}

/// Result of a virtual-to-physical address translation (ITLB or DTLB walk).
pub struct TranslationResult {
    /// The translated physical address, or zero if translation faulted.
    pub paddr: super::addr::PhysAddr,
    /// Simulated cycles consumed walking the page tables.
    pub cycles: u64,
    /// Trap raised during translation, if any.
    pub trap: Option<Trap>,
}

impl TranslationResult {
    #[inline]
    pub fn success(paddr: super::addr::PhysAddr, cycles: u64) -> Self {
        Self {
            paddr,
            cycles,
            trap: None,
        }
    }

    #[inline]
    pub fn fault(trap: Trap, cycles: u64) -> Self {
        Self {
            paddr: super::addr::PhysAddr(0),
            cycles,
            trap: Some(trap),
        }
    }
}

/// Errors returned when a [`crate::config::Config`] fails validation or a
/// [`crate::core::Core`] cannot be constructed from it.
///
/// Distinct from [`Trap`]: this is ordinary host-facing error handling for
/// malformed construction-time configuration, not in-pipeline data (`§7` addendum).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A size field that must be a positive power of two was zero or not one.
    #[error("{field} must be a power of two greater than zero, got {value}")]
    NotPowerOfTwo { field: &'static str, value: u64 },

    /// The ROB is too large to be addressed by the IQ tag encoding's low bits
    /// (`§4.1`: `thread_id` occupies the tag's high bits, ROB index the rest).
    #[error(
        "rob_size {rob_size} exceeds the addressable range for {thread_count} thread(s) \
         (max {max} entries per thread given the tag encoding)"
    )]
    RobTooLarge {
        rob_size: u32,
        thread_count: u32,
        max: u32,
    },

    /// `thread_count` was zero, or exceeded the simulator's hard SMT width limit.
    #[error("thread_count {0} is out of range (must be 1..=MAX_THREADS)")]
    ThreadCountOutOfRange(u32),

    /// A field that must be nonzero (a queue size, a pipeline width) was zero.
    #[error("{0} must be nonzero")]
    ZeroSized(&'static str),

    /// A cluster configuration referenced a functional-unit class with no cluster.
    #[error("opcode class {0:?} is not assigned to any cluster")]
    UnroutableOpClass(crate::core::pipeline::uop::OpClass),
}
