//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Building model profiles and catalogs
//! - Building sub-tasks
//! - A scripted in-process worker with per-task delays and failures

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use hive::core::{ModelProfile, SubTask, TaskType};
use hive::swarm::{DependencyContext, Worker, WorkerOutput};
use hive::Result;

/// Build a minimal profile with one suitability weight.
pub fn profile(id: &str, enabled: bool, task_type: TaskType, suitability: f64) -> ModelProfile {
    ModelProfile {
        id: id.to_string(),
        provider: "test".to_string(),
        model: format!("{}-base", id),
        enabled_by_default: enabled,
        input_cost_per_1k: 0.001,
        output_cost_per_1k: 0.002,
        latency_p50_ms: 500,
        latency_p95_ms: 1500,
        supports_tools: false,
        supports_json: true,
        supports_long_context: false,
        max_context_tokens: 32_000,
        suitability: HashMap::from([(task_type, suitability)]),
    }
}

pub fn task(id: &str, worker: &str) -> SubTask {
    SubTask::new(id, worker, &format!("{} instructions", id))
}

pub fn task_with_deps(id: &str, worker: &str, deps: &[&str]) -> SubTask {
    task(id, worker).depends_on(deps)
}

/// In-process worker driven by per-task scripts.
///
/// Unscripted tasks finish after a default 5ms delay with one step. The
/// output records the task id and how many dependency results it saw.
#[derive(Default)]
pub struct ScriptedWorker {
    delays: HashMap<String, Duration>,
    steps: HashMap<String, u32>,
    failures: HashSet<String>,
}

impl ScriptedWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, task_id: &str, delay: Duration) -> Self {
        self.delays.insert(task_id.to_string(), delay);
        self
    }

    pub fn steps(mut self, task_id: &str, steps: u32) -> Self {
        self.steps.insert(task_id.to_string(), steps);
        self
    }

    pub fn fail(mut self, task_id: &str) -> Self {
        self.failures.insert(task_id.to_string());
        self
    }
}

impl Worker for ScriptedWorker {
    fn invoke(
        &self,
        task: SubTask,
        deps: DependencyContext,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<WorkerOutput>> {
        let delay = self
            .delays
            .get(&task.id)
            .copied()
            .unwrap_or(Duration::from_millis(5));
        let steps = self.steps.get(&task.id).copied().unwrap_or(1);
        let fail = self.failures.contains(&task.id);
        async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(hive::Error::Validation(format!("{} cancelled", task.id)));
                }
            }
            if fail {
                Err(hive::Error::Validation(format!(
                    "scripted failure for {}",
                    task.id
                )))
            } else {
                Ok(WorkerOutput::new(
                    format!("{} done deps={}", task.id, deps.len()),
                    steps,
                ))
            }
        }
        .boxed()
    }
}
