//! # Architecture Abstraction Layer
//!
//! Hardware boundary for the scheduler: the tick source and the
//! low-power instructions. Currently implements the Cortex-M4 port;
//! interrupt masking comes from the `critical-section` implementation
//! that `cortex-m` provides. Extensible to other architectures by adding
//! sibling modules.

pub mod cortex_m4;
