//! Configuration for the out-of-order core pipeline.
//!
//! Every key named in `§6`'s configuration-key table is a field of [`Config`]
//! or one of its nested section structs, following the same shape as the
//! rest of this crate: a `defaults` module of named constants, per-field
//! `#[serde(default = ...)]` helpers, and a hand-written `Default` impl.

use serde::Deserialize;

use crate::common::error::ConfigError;

/// Baseline values for every tunable in the core, used when a field is
/// absent from the deserialized configuration.
mod defaults {
    /// Per-cluster issue queue capacity.
    pub const ISSUE_QUEUE_SIZE: u32 = 16;
    /// Reorder buffer capacity per thread.
    pub const ROB_SIZE: u32 = 128;
    /// Load queue capacity per thread.
    pub const LDQ_SIZE: u32 = 48;
    /// Store queue capacity per thread.
    pub const STQ_SIZE: u32 = 32;
    /// Fetch queue capacity per thread.
    pub const FETCH_QUEUE_SIZE: u32 = 32;
    /// Physical register file capacity, per file.
    pub const PHYS_REG_FILE_SIZE: u32 = 256;

    /// Uops fetched per thread per cycle.
    pub const FETCH_WIDTH: u32 = 4;
    /// Uops advanced through the artificial frontend delay per cycle.
    pub const FRONTEND_WIDTH: u32 = 4;
    /// Uops dispatched (rename output) per cycle, across threads.
    pub const DISPATCH_WIDTH: u32 = 4;
    /// Uops issued per cluster per cycle.
    pub const MAX_ISSUE_WIDTH: u32 = 4;
    /// Uops written back per cycle, across clusters.
    pub const WRITEBACK_WIDTH: u32 = 4;
    /// Uops committed per cycle, across threads.
    pub const COMMIT_WIDTH: u32 = 4;

    /// Artificial rename→dispatch pipeline delay, in cycles.
    pub const FRONTEND_STAGES: u32 = 2;

    /// Worst-case cross-cluster bypass latency, in cycles.
    pub const MAX_FORWARDING_LATENCY: u32 = 3;

    /// Cycles of zero-dispatch-with-nonempty-queue before selective flush.
    pub const DISPATCH_DEADLOCK_COUNTDOWN: u32 = 256;

    /// Per-thread cycles with zero commits before the hard watchdog trips,
    /// multiplied by the thread count (`§4.9`/`§5`).
    pub const COMMIT_DEADLOCK_CYCLES_PER_THREAD: u64 = 1_000_000;

    /// Unaligned-access predictor bit-array size (must be a power of two).
    pub const UNALIGNED_PREDICTOR_SIZE: u32 = 4096;

    /// Number of functional-unit clusters.
    pub const CLUSTER_COUNT: u32 = 2;

    /// Functional units available per cluster, bounding how many `Issued`
    /// uops that cluster may clock down concurrently (`§4.4`).
    pub const FU_COUNT_PER_CLUSTER: u32 = 2;

    /// SMT thread contexts per core.
    pub const THREAD_COUNT: u32 = 2;

    /// Bits of ROB index addressable by the IQ tag encoding's low bits.
    pub const MAX_ROB_IDX_BIT: u32 = 12;
}

/// Reorder buffer, load/store queue, fetch queue, and PRF capacities (`§6`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QueueSizes {
    /// Per-cluster issue queue capacity (`ISSUE_QUEUE_SIZE`).
    #[serde(default = "QueueSizes::default_iq")]
    pub issue_queue_size: u32,
    /// Per-thread ROB capacity (`ROB_SIZE`).
    #[serde(default = "QueueSizes::default_rob")]
    pub rob_size: u32,
    /// Per-thread load queue capacity (`LDQ_SIZE`).
    #[serde(default = "QueueSizes::default_ldq")]
    pub ldq_size: u32,
    /// Per-thread store queue capacity (`STQ_SIZE`).
    #[serde(default = "QueueSizes::default_stq")]
    pub stq_size: u32,
    /// Per-thread fetch queue capacity (`FETCH_QUEUE_SIZE`).
    #[serde(default = "QueueSizes::default_fetchq")]
    pub fetch_queue_size: u32,
    /// Per-file physical register count (`PHYS_REG_FILE_SIZE`).
    pub phys_reg_file_size: u32,
}

impl QueueSizes {
    fn default_iq() -> u32 {
        defaults::ISSUE_QUEUE_SIZE
    }
    fn default_rob() -> u32 {
        defaults::ROB_SIZE
    }
    fn default_ldq() -> u32 {
        defaults::LDQ_SIZE
    }
    fn default_stq() -> u32 {
        defaults::STQ_SIZE
    }
    fn default_fetchq() -> u32 {
        defaults::FETCH_QUEUE_SIZE
    }
}

impl Default for QueueSizes {
    fn default() -> Self {
        Self {
            issue_queue_size: defaults::ISSUE_QUEUE_SIZE,
            rob_size: defaults::ROB_SIZE,
            ldq_size: defaults::LDQ_SIZE,
            stq_size: defaults::STQ_SIZE,
            fetch_queue_size: defaults::FETCH_QUEUE_SIZE,
            phys_reg_file_size: defaults::PHYS_REG_FILE_SIZE,
        }
    }
}

/// Per-cycle per-stage bandwidth limits (`§6`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PipelineWidths {
    #[serde(default = "PipelineWidths::default_fetch")]
    pub fetch_width: u32,
    #[serde(default = "PipelineWidths::default_frontend")]
    pub frontend_width: u32,
    #[serde(default = "PipelineWidths::default_dispatch")]
    pub dispatch_width: u32,
    #[serde(default = "PipelineWidths::default_issue")]
    pub max_issue_width: u32,
    #[serde(default = "PipelineWidths::default_writeback")]
    pub writeback_width: u32,
    #[serde(default = "PipelineWidths::default_commit")]
    pub commit_width: u32,
    /// Artificial rename→dispatch delay, in cycles (`FRONTEND_STAGES`).
    #[serde(default = "PipelineWidths::default_frontend_stages")]
    pub frontend_stages: u32,
}

impl PipelineWidths {
    fn default_fetch() -> u32 {
        defaults::FETCH_WIDTH
    }
    fn default_frontend() -> u32 {
        defaults::FRONTEND_WIDTH
    }
    fn default_dispatch() -> u32 {
        defaults::DISPATCH_WIDTH
    }
    fn default_issue() -> u32 {
        defaults::MAX_ISSUE_WIDTH
    }
    fn default_writeback() -> u32 {
        defaults::WRITEBACK_WIDTH
    }
    fn default_commit() -> u32 {
        defaults::COMMIT_WIDTH
    }
    fn default_frontend_stages() -> u32 {
        defaults::FRONTEND_STAGES
    }
}

impl Default for PipelineWidths {
    fn default() -> Self {
        Self {
            fetch_width: defaults::FETCH_WIDTH,
            frontend_width: defaults::FRONTEND_WIDTH,
            dispatch_width: defaults::DISPATCH_WIDTH,
            max_issue_width: defaults::MAX_ISSUE_WIDTH,
            writeback_width: defaults::WRITEBACK_WIDTH,
            commit_width: defaults::COMMIT_WIDTH,
            frontend_stages: defaults::FRONTEND_STAGES,
        }
    }
}

/// Functional-unit cluster count and bypass-network timing (`§6`, `§4.4`, `§4.5`).
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Number of functional-unit clusters.
    #[serde(default = "ClusterConfig::default_count")]
    pub cluster_count: u32,
    /// Worst-case cross-cluster forwarding latency, in cycles.
    #[serde(default = "ClusterConfig::default_forward_latency")]
    pub max_forwarding_latency: u32,
    /// `intercluster_latency_map[from][to]`, in cycles; diagonal is zero.
    /// Defaults to a uniform `max_forwarding_latency` off-diagonal matrix.
    #[serde(default)]
    pub intercluster_latency: Option<Vec<Vec<u32>>>,
    /// Functional units available per cluster.
    #[serde(default = "ClusterConfig::default_fu_count")]
    pub fu_count_per_cluster: u32,
}

impl ClusterConfig {
    fn default_count() -> u32 {
        defaults::CLUSTER_COUNT
    }
    fn default_forward_latency() -> u32 {
        defaults::MAX_FORWARDING_LATENCY
    }
    fn default_fu_count() -> u32 {
        defaults::FU_COUNT_PER_CLUSTER
    }

    /// The effective `intercluster_latency_map`, synthesizing a uniform
    /// matrix from `max_forwarding_latency` when none was supplied.
    #[must_use]
    pub fn latency_matrix(&self) -> Vec<Vec<u32>> {
        if let Some(m) = &self.intercluster_latency {
            return m.clone();
        }
        let n = self.cluster_count as usize;
        (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| if i == j { 0 } else { self.max_forwarding_latency })
                    .collect()
            })
            .collect()
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_count: defaults::CLUSTER_COUNT,
            max_forwarding_latency: defaults::MAX_FORWARDING_LATENCY,
            intercluster_latency: None,
            fu_count_per_cluster: defaults::FU_COUNT_PER_CLUSTER,
        }
    }
}

/// SMT thread count and fetch/dispatch/deadlock tuning (`§6`, `§4.9`, `§5`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SmtConfig {
    /// Number of hardware thread contexts per core (`threads`).
    #[serde(default = "SmtConfig::default_threads")]
    pub thread_count: u32,
    /// Cycles a thread may sit in `ready_to_dispatch` with zero dispatches
    /// before the selective-flush recovery fires (`DISPATCH_DEADLOCK_COUNTDOWN`).
    #[serde(default = "SmtConfig::default_dispatch_deadlock")]
    pub dispatch_deadlock_countdown: u32,
    /// Per-thread cycles with zero commits before the hard deadlock
    /// watchdog aborts; effective threshold is this value times `thread_count`.
    #[serde(default = "SmtConfig::default_commit_deadlock")]
    pub commit_deadlock_cycles_per_thread: u64,
}

impl SmtConfig {
    fn default_threads() -> u32 {
        defaults::THREAD_COUNT
    }
    fn default_dispatch_deadlock() -> u32 {
        defaults::DISPATCH_DEADLOCK_COUNTDOWN
    }
    fn default_commit_deadlock() -> u64 {
        defaults::COMMIT_DEADLOCK_CYCLES_PER_THREAD
    }
}

impl Default for SmtConfig {
    fn default() -> Self {
        Self {
            thread_count: defaults::THREAD_COUNT,
            dispatch_deadlock_countdown: defaults::DISPATCH_DEADLOCK_COUNTDOWN,
            commit_deadlock_cycles_per_thread: defaults::COMMIT_DEADLOCK_CYCLES_PER_THREAD,
        }
    }
}

/// Top-level core configuration not otherwise grouped: the unaligned
/// predictor and the optional verification/tracing toggles (`§6`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CoreConfig {
    /// Unaligned-access predictor bit-array size; must be a power of two.
    #[serde(default = "CoreConfig::default_unaligned_predictor")]
    pub unaligned_predictor_size: u32,
    /// Enables an extra architectural-state consistency checker after each commit.
    #[serde(default)]
    pub checker_enabled: bool,
    /// Enables the `commit-log` tracing event stream.
    #[serde(default)]
    pub event_log_enabled: bool,
}

impl CoreConfig {
    fn default_unaligned_predictor() -> u32 {
        defaults::UNALIGNED_PREDICTOR_SIZE
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            unaligned_predictor_size: defaults::UNALIGNED_PREDICTOR_SIZE,
            checker_enabled: false,
            event_log_enabled: false,
        }
    }
}

/// Root configuration for a core, validated by [`Config::validate`] before
/// construction.
///
/// # Examples
///
/// ```
/// use ooocore::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.smt.thread_count, 2);
/// assert_eq!(config.queues.rob_size, 128);
/// config.validate().unwrap();
/// ```
///
/// Deserializing from JSON:
///
/// ```
/// use ooocore::config::Config;
///
/// let json = r#"{
///     "smt": { "thread_count": 4 },
///     "queues": { "rob_size": 64, "phys_reg_file_size": 192 },
///     "cluster": { "cluster_count": 3 }
/// }"#;
///
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.smt.thread_count, 4);
/// assert_eq!(config.queues.rob_size, 64);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Queue and file capacities.
    #[serde(default)]
    pub queues: QueueSizes,
    /// Per-stage bandwidth limits.
    #[serde(default)]
    pub widths: PipelineWidths,
    /// Cluster topology and bypass timing.
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// SMT thread count and deadlock tuning.
    #[serde(default)]
    pub smt: SmtConfig,
    /// Ungrouped core-level toggles.
    #[serde(default)]
    pub core: CoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queues: QueueSizes::default(),
            widths: PipelineWidths::default(),
            cluster: ClusterConfig::default(),
            smt: SmtConfig::default(),
            core: CoreConfig::default(),
        }
    }
}

impl Config {
    /// Checks every size field is sane and that `rob_size` fits the IQ tag
    /// encoding's per-thread addressable range (`§4.1`, `§6`: `ROB_SIZE ≤
    /// 2^MAX_ROB_IDX_BIT`).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smt.thread_count == 0 {
            return Err(ConfigError::ThreadCountOutOfRange(self.smt.thread_count));
        }
        for (field, value) in [
            ("issue_queue_size", self.queues.issue_queue_size),
            ("rob_size", self.queues.rob_size),
            ("ldq_size", self.queues.ldq_size),
            ("stq_size", self.queues.stq_size),
            ("fetch_queue_size", self.queues.fetch_queue_size),
            ("phys_reg_file_size", self.queues.phys_reg_file_size),
            ("cluster_count", self.cluster.cluster_count),
            ("fu_count_per_cluster", self.cluster.fu_count_per_cluster),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroSized(field));
            }
        }
        if !self.core.unaligned_predictor_size.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                field: "unaligned_predictor_size",
                value: u64::from(self.core.unaligned_predictor_size),
            });
        }
        let max = 1u32 << defaults::MAX_ROB_IDX_BIT;
        if self.queues.rob_size > max {
            return Err(ConfigError::RobTooLarge {
                rob_size: self.queues.rob_size,
                thread_count: self.smt.thread_count,
                max,
            });
        }
        Ok(())
    }
}
