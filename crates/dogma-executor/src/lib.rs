//! # dogma-executor: the local command executor (C4)
//!
//! Accepts a [`dogma_types::Command`], enforces read-only gating, and
//! dispatches to [`dogma_kernel::Storage`] on a bounded worker pool. This is
//! the single-replica correctness core that [`dogma-replication`]'s
//! `ReplicatedExecutor` wraps.

mod bounded_queue;
mod dispatch;
mod local;
mod outcome;
mod session_sink;

pub use dispatch::dispatch;
pub use local::{LocalExecutor, DEFAULT_WORKER_COUNT};
pub use outcome::ExecutionOutcome;
pub use session_sink::SessionSink;
