//! # Engine Execution
//!
//! The two ways a native call reaches an engine handle:
//!
//! - [`BoundedEngineExecutor`]: N interchangeable slots fed from one channel (default)
//! - [`PriorityDispatchQueue`]: tiered queue drained by workers with affinity ids and
//!   capability sets
//!
//! Both implement [`EngineInvoker`](crate::resilience::EngineInvoker), so the retrying
//! caller can sit on top of either.

pub mod dispatcher;
pub mod executor;
pub mod priority_queue;

pub use dispatcher::{
    PendingResult, PriorityDispatchQueue, ResponseRegistry, WorkResult, WorkerPhase,
    WorkerSnapshot, WorkerStatus,
};
pub use executor::{BoundedEngineExecutor, ExecutorStats};
pub use priority_queue::{DispatchQueue, PriorityTier, WorkItem};
