//! # Configuration Tests
//!
//! Defaults, deserialization, and validation for the core configuration.

use ooocore::common::ConfigError;
use ooocore::config::{ClusterConfig, Config, CoreConfig, PipelineWidths, QueueSizes, SmtConfig};

#[test]
fn default_config_matches_documented_baseline() {
    let config = Config::default();
    assert_eq!(config.queues.rob_size, 128);
    assert_eq!(config.queues.phys_reg_file_size, 256);
    assert_eq!(config.smt.thread_count, 2);
    assert_eq!(config.cluster.cluster_count, 2);
    assert!(config.core.unaligned_predictor_size.is_power_of_two());
    config.validate().unwrap();
}

#[test]
fn queue_sizes_default() {
    let q = QueueSizes::default();
    assert_eq!(q.issue_queue_size, 16);
    assert_eq!(q.ldq_size, 48);
    assert_eq!(q.stq_size, 32);
    assert_eq!(q.fetch_queue_size, 32);
}

#[test]
fn pipeline_widths_default() {
    let w = PipelineWidths::default();
    assert_eq!(w.fetch_width, 4);
    assert_eq!(w.commit_width, 4);
    assert_eq!(w.frontend_stages, 2);
}

#[test]
fn cluster_config_synthesizes_uniform_latency_matrix_when_unset() {
    let cluster = ClusterConfig {
        cluster_count: 3,
        max_forwarding_latency: 5,
        intercluster_latency: None,
        fu_count_per_cluster: 2,
    };
    let matrix = cluster.latency_matrix();
    assert_eq!(matrix.len(), 3);
    for (i, row) in matrix.iter().enumerate() {
        for (j, &latency) in row.iter().enumerate() {
            assert_eq!(latency, if i == j { 0 } else { 5 });
        }
    }
}

#[test]
fn cluster_config_honors_explicit_latency_matrix() {
    let explicit = vec![vec![0, 9], vec![9, 0]];
    let cluster = ClusterConfig {
        cluster_count: 2,
        max_forwarding_latency: 1,
        intercluster_latency: Some(explicit.clone()),
        fu_count_per_cluster: 2,
    };
    assert_eq!(cluster.latency_matrix(), explicit);
}

#[test]
fn smt_and_core_defaults() {
    let smt = SmtConfig::default();
    assert_eq!(smt.thread_count, 2);
    assert_eq!(smt.commit_deadlock_cycles_per_thread, 1_000_000);

    let core = CoreConfig::default();
    assert!(!core.checker_enabled);
    assert!(!core.event_log_enabled);
}

#[test]
fn validate_rejects_zero_thread_count() {
    let mut config = Config::default();
    config.smt.thread_count = 0;
    assert_eq!(config.validate(), Err(ConfigError::ThreadCountOutOfRange(0)));
}

#[test]
fn validate_rejects_zero_sized_queue() {
    let mut config = Config::default();
    config.queues.rob_size = 0;
    assert_eq!(config.validate(), Err(ConfigError::ZeroSized("rob_size")));
}

#[test]
fn validate_rejects_non_power_of_two_predictor_size() {
    let mut config = Config::default();
    config.core.unaligned_predictor_size = 100;
    assert_eq!(
        config.validate(),
        Err(ConfigError::NotPowerOfTwo {
            field: "unaligned_predictor_size",
            value: 100,
        })
    );
}

#[test]
fn validate_rejects_oversized_rob() {
    let mut config = Config::default();
    config.queues.rob_size = 1 << 13;
    let thread_count = config.smt.thread_count;
    assert_eq!(
        config.validate(),
        Err(ConfigError::RobTooLarge {
            rob_size: 1 << 13,
            thread_count,
            max: 1 << 12,
        })
    );
}

#[test]
fn deserializes_partial_json_with_defaults_filled_in() {
    let json = r#"{
        "smt": { "thread_count": 4 },
        "queues": { "rob_size": 64, "phys_reg_file_size": 192 },
        "cluster": { "cluster_count": 3 }
    }"#;
    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.smt.thread_count, 4);
    assert_eq!(config.queues.rob_size, 64);
    assert_eq!(config.queues.issue_queue_size, 16);
    config.validate().unwrap();
}
