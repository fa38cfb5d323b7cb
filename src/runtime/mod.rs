//! Runtime: CPU affinity, NUMA placement, the sense-reversing barrier,
//! and the fork-join worker pool built on top of them.

pub mod affinity;
pub mod barrier;
pub mod numa;
pub mod pool;

pub use affinity::CorePlan;
pub use barrier::Barrier;
pub use pool::WorkerPool;
