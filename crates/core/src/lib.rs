//! Out-of-order x86-64 micro-op pipeline core.
//!
//! This crate implements the cycle-accurate engine of a superscalar,
//! simultaneous-multithreaded x86-64 core: fetch from a pre-translated
//! basic-block cache, rename against a physical register file, dispatch
//! into per-cluster issue queues, out-of-order issue and execute, and
//! strictly in-order, macro-op-atomic commit. It drives its surrounding
//! host (architectural state, memory hierarchy, block cache, branch
//! predictor) entirely through the traits in `core::pipeline::traits`;
//! it owns no decoder, no cache model, and no ISA semantics of its own.

/// Common types and constants (addresses, register and thread/cluster ids,
/// traps, translation results).
pub mod common;
/// Core configuration: queue sizes, pipeline widths, cluster topology, SMT
/// and core-level parameters.
pub mod config;
/// The out-of-order core and its pipeline stages.
pub mod core;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// The out-of-order core; construct with `Core::new`.
pub use crate::core::Core;
