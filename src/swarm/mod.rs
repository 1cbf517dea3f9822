//! Swarm execution layer.
//!
//! This module turns a flat list of sub-tasks with dependency edges into
//! staged concurrent execution: the graph resolves readiness, the scheduler
//! fans stages out to workers and races the run against a deadline, and the
//! trace derives parallelism diagnostics.

pub mod graph;
pub mod scheduler;
pub mod trace;

pub use graph::TaskGraph;
pub use scheduler::{DependencyContext, SwarmScheduler, Worker, WorkerOutput};
pub use trace::{
    Bottleneck, ExecutionTrace, ParallelizationMetrics, RunId, StageTrace,
    SCHEDULER_OVERHEAD_STEPS, SERIAL_COLLAPSE_THRESHOLD,
};
