//! Execution traces and parallelism diagnostics.
//!
//! The scheduler appends a [`StageTrace`] per stage as it runs; the
//! finished (or partial, on deadline) [`ExecutionTrace`] is the input to
//! [`ParallelizationMetrics`], the read-only view consumed by callers and
//! dashboards.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::TaskResult;

/// Fixed step count charged for the scheduler's own bookkeeping when
/// accounting the critical path.
pub const SCHEDULER_OVERHEAD_STEPS: u32 = 1;

/// Fewer tasks than this cannot benefit from parallelism.
pub const SERIAL_COLLAPSE_THRESHOLD: usize = 3;

/// Unique identifier for one swarm run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Results of one stage: every task here ran concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTrace {
    /// Zero-based stage position.
    pub index: usize,
    /// Results of the tasks launched in this stage, in settle order.
    pub results: Vec<TaskResult>,
    /// Wall-clock time from stage launch to last task settling.
    pub duration: Duration,
}

impl StageTrace {
    /// The largest step count among this stage's tasks: the stage's
    /// contribution to the critical path.
    pub fn max_steps(&self) -> u32 {
        self.results.iter().map(|r| r.steps).max().unwrap_or(0)
    }
}

/// Ordered record of a swarm run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub run_id: RunId,
    pub stages: Vec<StageTrace>,
    /// Wall-clock time of the whole run (or of the portion that finished,
    /// for a partial trace).
    pub wall_clock: Duration,
    /// Bookkeeping step constant included in critical-path accounting.
    pub overhead_steps: u32,
}

impl ExecutionTrace {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            stages: Vec::new(),
            wall_clock: Duration::ZERO,
            overhead_steps: SCHEDULER_OVERHEAD_STEPS,
        }
    }

    /// Total tasks across all stages.
    pub fn total_tasks(&self) -> usize {
        self.stages.iter().map(|s| s.results.len()).sum()
    }

    /// Every result across all stages, stage order.
    pub fn results(&self) -> impl Iterator<Item = &TaskResult> {
        self.stages.iter().flat_map(|s| s.results.iter())
    }

    /// Derive parallelism diagnostics from this trace.
    pub fn metrics(&self) -> ParallelizationMetrics {
        let total_tasks = self.total_tasks();
        let wall_clock_ms = self.wall_clock.as_secs_f64() * 1000.0;

        let critical_steps = self.overhead_steps
            + self.stages.iter().map(StageTrace::max_steps).sum::<u32>();

        let summed_latency_ms: f64 = self
            .results()
            .map(|r| r.latency.as_secs_f64() * 1000.0)
            .sum();

        let latency_reduction = if wall_clock_ms > 0.0 {
            summed_latency_ms / wall_clock_ms
        } else {
            0.0
        };

        let bottleneck = self
            .results()
            .max_by_key(|r| r.latency)
            .map(|r| Bottleneck {
                task_id: r.task_id.clone(),
                latency: r.latency,
            });

        let tasks_per_second = if wall_clock_ms > 0.0 {
            total_tasks as f64 / (wall_clock_ms / 1000.0)
        } else {
            0.0
        };

        ParallelizationMetrics {
            total_tasks,
            wall_clock_ms,
            critical_steps,
            latency_reduction,
            serial_collapse: total_tasks < SERIAL_COLLAPSE_THRESHOLD,
            bottleneck,
            tasks_per_second,
        }
    }
}

/// The single slowest task of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub task_id: String,
    pub latency: Duration,
}

/// Read-only parallelism diagnostics derived from an [`ExecutionTrace`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelizationMetrics {
    pub total_tasks: usize,
    pub wall_clock_ms: f64,
    /// Overhead constant plus the per-stage maximum step counts, summed
    /// across stages: the step length of the critical path.
    pub critical_steps: u32,
    /// Sum of individual task latencies divided by wall-clock time; how
    /// much latency the fan-out saved over serial execution.
    pub latency_reduction: f64,
    /// True when too few tasks ran to benefit from parallelism.
    pub serial_collapse: bool,
    pub bottleneck: Option<Bottleneck>,
    pub tasks_per_second: f64,
}
