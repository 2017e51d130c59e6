//! Common types shared across the core pipeline.
//!
//! 1. **Address types:** strong types for virtual and physical addresses.
//! 2. **Identifiers:** architectural register, thread, and cluster indices.
//! 3. **Error handling:** the in-pipeline [`Trap`] taxonomy and host-facing
//!    construction errors.

/// Address type definitions (physical and virtual addresses).
pub mod addr;

/// Small index newtypes threaded through the pipeline (`ArchReg`, `ThreadId`, `ClusterId`).
pub mod ids;

/// Trap taxonomy and configuration-construction errors.
pub mod error;

pub use addr::{PhysAddr, VirtAddr};
pub use error::{ConfigError, Trap, TranslationResult};
pub use ids::{ArchReg, ClusterId, ThreadId};
