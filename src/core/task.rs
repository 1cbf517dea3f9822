//! Task data model for swarm execution.
//!
//! A [`SubTask`] is the atomic unit of work submitted to the scheduler.
//! Execution produces a [`TaskResult`] per task; a failed worker invocation
//! is still a result (with a [`TaskOutcome::Failed`] marker), never an
//! exception, so the rest of the graph can make progress around it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single node of a task graph.
///
/// Ids are opaque strings, unique within one graph submission. Every
/// `depends_on` entry must name another id in the same submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    /// Identifier unique within one graph submission.
    pub id: String,
    /// Id of the worker that should execute this task.
    pub worker: String,
    /// Free-text description of what the task should accomplish.
    pub description: String,
    /// Ids of tasks whose results this task needs before it can start.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl SubTask {
    /// Create an independent task (no dependencies).
    pub fn new(id: &str, worker: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            worker: worker.to_string(),
            description: description.to_string(),
            depends_on: Vec::new(),
        }
    }

    /// Declare dependencies on other task ids.
    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.depends_on = ids.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// How a single task invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskOutcome {
    /// The worker finished and produced output.
    Completed {
        /// Result payload, opaque to the scheduler.
        output: String,
    },
    /// The worker failed; siblings and dependents are unaffected.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }

    /// The output payload, if the task completed.
    pub fn output(&self) -> Option<&str> {
        match self {
            TaskOutcome::Completed { output } => Some(output),
            TaskOutcome::Failed { .. } => None,
        }
    }
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Completed { .. } => write!(f, "completed"),
            TaskOutcome::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// The recorded result of one task invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Id of the task this result belongs to.
    pub task_id: String,
    /// Id of the worker that executed it.
    pub worker_id: String,
    /// Outcome, carrying either the payload or an error marker.
    pub outcome: TaskOutcome,
    /// Wall-clock latency of this single invocation.
    pub latency: Duration,
    /// Internal reasoning/tool iterations the worker needed. Used for
    /// critical-path accounting.
    pub steps: u32,
}

impl TaskResult {
    pub fn completed(
        task_id: &str,
        worker_id: &str,
        output: String,
        latency: Duration,
        steps: u32,
    ) -> Self {
        Self {
            task_id: task_id.to_string(),
            worker_id: worker_id.to_string(),
            outcome: TaskOutcome::Completed { output },
            latency,
            steps,
        }
    }

    pub fn failed(task_id: &str, worker_id: &str, error: String, latency: Duration) -> Self {
        Self {
            task_id: task_id.to_string(),
            worker_id: worker_id.to_string(),
            outcome: TaskOutcome::Failed { error },
            latency,
            steps: 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_failure()
    }
}
