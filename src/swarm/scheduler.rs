//! Staged concurrent execution of task graphs.
//!
//! The scheduler resolves a task graph into stages (maximal sets of tasks
//! whose dependencies are satisfied), launches each stage's tasks
//! concurrently through a caller-supplied [`Worker`], and races the whole
//! run against a wall-clock deadline.
//!
//! Failure policy: structural problems (duplicate ids, unresolved
//! references, cycles, the deadline) abort the run; a single worker failing
//! — or panicking — becomes that task's [`TaskOutcome::Failed`] result and
//! still satisfies downstream dependencies, so one specialist going down
//! cannot deadlock the rest of the graph.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::{SubTask, TaskResult};
use crate::error::{Error, Result};
use crate::swarm::graph::TaskGraph;
use crate::swarm::trace::{ExecutionTrace, RunId, StageTrace};
use crate::{hlog, hlog_debug, hlog_warn};

/// What a worker hands back from one successful invocation.
#[derive(Debug, Clone)]
pub struct WorkerOutput {
    /// Result payload, opaque to the scheduler.
    pub output: String,
    /// Internal reasoning/tool iterations the worker needed.
    pub steps: u32,
}

impl WorkerOutput {
    pub fn new(output: impl Into<String>, steps: u32) -> Self {
        Self {
            output: output.into(),
            steps,
        }
    }
}

/// Completed dependency results handed to a worker invocation.
///
/// Every task of a stage receives the same completed snapshot taken at
/// stage start; siblings never observe each other.
#[derive(Debug, Clone, Default)]
pub struct DependencyContext {
    results: HashMap<String, TaskResult>,
}

impl DependencyContext {
    fn for_task(task: &SubTask, completed: &HashMap<String, TaskResult>) -> Self {
        let results = task
            .depends_on
            .iter()
            .filter_map(|dep| completed.get(dep).map(|r| (dep.clone(), r.clone())))
            .collect();
        Self { results }
    }

    pub fn get(&self, id: &str) -> Option<&TaskResult> {
        self.results.get(id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TaskResult)> {
        self.results.iter()
    }

    /// Serialize the dependency outputs into a block a worker can prepend
    /// to its instructions. Entries are sorted by task id for stability.
    pub fn render(&self) -> String {
        let mut ids: Vec<&String> = self.results.keys().collect();
        ids.sort();
        let mut out = String::new();
        for id in ids {
            let result = &self.results[id];
            match result.outcome.output() {
                Some(payload) => {
                    out.push_str(&format!("### {} ###\n{}\n", id, payload));
                }
                None => {
                    out.push_str(&format!("### {} (failed) ###\n{}\n", id, result.outcome));
                }
            }
        }
        out
    }
}

/// A worker invocation seam.
///
/// The scheduler is parameterized by this trait; in the running system the
/// implementation typically dispatches to a specialist agent which may
/// itself consult the model router. Implementations must be cancel-aware:
/// when the token fires the invocation should wind down promptly, though
/// the scheduler stops waiting either way.
pub trait Worker: Send + Sync {
    fn invoke(
        &self,
        task: SubTask,
        deps: DependencyContext,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<WorkerOutput>>;
}

/// Executes task graphs in dependency-ordered concurrent stages.
///
/// Holds no cross-run state: each `run` call builds its graph, trace, and
/// cancellation token fresh and discards them when the caller is done.
#[derive(Debug, Default)]
pub struct SwarmScheduler;

impl SwarmScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Compute the staged execution plan without running anything.
    ///
    /// Stage ids are sorted within each stage for stable output. Fails
    /// the same way `run` does on structural errors and cycles.
    pub fn plan(&self, tasks: Vec<SubTask>) -> Result<Vec<Vec<String>>> {
        let graph = TaskGraph::build(tasks)?;
        let mut done: HashSet<String> = HashSet::new();
        let mut stages = Vec::new();

        while !graph.all_complete(&done) {
            let ready: Vec<String> = graph
                .ready_tasks(&done)
                .iter()
                .map(|t| t.id.clone())
                .collect();
            if ready.is_empty() {
                return Err(Error::CircularDependency {
                    remaining: graph.pending_ids(&done),
                });
            }
            for id in &ready {
                done.insert(id.clone());
            }
            let mut ids = ready;
            ids.sort();
            stages.push(ids);
        }

        Ok(stages)
    }

    /// Execute a task graph against a wall-clock deadline.
    ///
    /// The deadline covers the whole run, not per-stage. When it fires the
    /// run's cancellation token is cancelled, in-flight invocations are no
    /// longer awaited, and [`Error::DeadlineExceeded`] carries whatever
    /// partial trace exists. An empty task list is valid and returns an
    /// empty trace immediately.
    pub async fn run(
        &self,
        tasks: Vec<SubTask>,
        worker: Arc<dyn Worker>,
        deadline: Duration,
    ) -> Result<ExecutionTrace> {
        let run_id = RunId::new();
        let graph = TaskGraph::build(tasks)?;
        hlog!(
            "SwarmScheduler: run {} started ({} tasks, deadline {:?})",
            run_id.short(),
            graph.len(),
            deadline
        );

        if graph.is_empty() {
            return Ok(ExecutionTrace::new(run_id));
        }

        let started = Instant::now();
        let cancel = CancellationToken::new();
        let partial = Arc::new(Mutex::new(ExecutionTrace::new(run_id)));

        tokio::select! {
            result = Self::drive(&graph, worker, &cancel, &partial, started) => result,
            _ = tokio::time::sleep(deadline) => {
                cancel.cancel();
                let mut trace = partial.lock().unwrap_or_else(|e| e.into_inner()).clone();
                trace.wall_clock = started.elapsed();
                hlog_warn!(
                    "SwarmScheduler: run {} exceeded deadline {:?} with {} stage(s) done",
                    run_id.short(),
                    deadline,
                    trace.stages.len()
                );
                Err(Error::DeadlineExceeded {
                    deadline,
                    partial: Box::new(trace),
                })
            }
        }
    }

    /// The staged loop: compute the ready set, fan it out, merge results,
    /// repeat. Stages are strictly sequential with respect to each other;
    /// only tasks within a stage run concurrently.
    async fn drive(
        graph: &TaskGraph,
        worker: Arc<dyn Worker>,
        cancel: &CancellationToken,
        partial: &Arc<Mutex<ExecutionTrace>>,
        started: Instant,
    ) -> Result<ExecutionTrace> {
        let mut completed: HashMap<String, TaskResult> = HashMap::new();
        let mut done: HashSet<String> = HashSet::new();
        let mut stage_index = 0;

        while !graph.all_complete(&done) {
            let ready: Vec<SubTask> = graph.ready_tasks(&done).into_iter().cloned().collect();
            if ready.is_empty() {
                // Tasks remain but none can start: a dependency cycle.
                return Err(Error::CircularDependency {
                    remaining: graph.pending_ids(&done),
                });
            }

            hlog_debug!(
                "SwarmScheduler: stage {} launching {} task(s)",
                stage_index,
                ready.len()
            );
            let stage_started = Instant::now();
            let results =
                Self::run_stage(ready, &completed, Arc::clone(&worker), cancel, stage_started)
                    .await;

            {
                let mut trace = partial.lock().unwrap_or_else(|e| e.into_inner());
                trace.stages.push(StageTrace {
                    index: stage_index,
                    results: results.clone(),
                    duration: stage_started.elapsed(),
                });
                trace.wall_clock = started.elapsed();
            }

            for result in results {
                done.insert(result.task_id.clone());
                completed.insert(result.task_id.clone(), result);
            }
            stage_index += 1;
        }

        let mut trace = partial.lock().unwrap_or_else(|e| e.into_inner()).clone();
        trace.wall_clock = started.elapsed();
        hlog!(
            "SwarmScheduler: run {} completed, {} stage(s) in {:?}",
            trace.run_id.short(),
            trace.stages.len(),
            trace.wall_clock
        );
        Ok(trace)
    }

    /// Launch one stage's tasks concurrently and wait for all of them to
    /// settle. A worker error or panic becomes that task's failed result.
    async fn run_stage(
        ready: Vec<SubTask>,
        completed: &HashMap<String, TaskResult>,
        worker: Arc<dyn Worker>,
        cancel: &CancellationToken,
        stage_started: Instant,
    ) -> Vec<TaskResult> {
        let mut join: JoinSet<TaskResult> = JoinSet::new();
        let mut spawned: HashMap<tokio::task::Id, (String, String)> = HashMap::new();

        for task in ready {
            let deps = DependencyContext::for_task(&task, completed);
            let worker = Arc::clone(&worker);
            let token = cancel.child_token();
            let key = (task.id.clone(), task.worker.clone());
            let handle = join.spawn(async move {
                let task_id = task.id.clone();
                let worker_id = task.worker.clone();
                let invoke_started = Instant::now();
                match worker.invoke(task, deps, token).await {
                    Ok(out) => TaskResult::completed(
                        &task_id,
                        &worker_id,
                        out.output,
                        invoke_started.elapsed(),
                        out.steps,
                    ),
                    Err(e) => {
                        hlog_warn!("SwarmScheduler: task {} failed: {}", task_id, e);
                        TaskResult::failed(
                            &task_id,
                            &worker_id,
                            e.to_string(),
                            invoke_started.elapsed(),
                        )
                    }
                }
            });
            spawned.insert(handle.id(), key);
        }

        let mut results = Vec::with_capacity(spawned.len());
        while let Some(joined) = join.join_next_with_id().await {
            match joined {
                Ok((id, result)) => {
                    spawned.remove(&id);
                    results.push(result);
                }
                Err(join_err) => {
                    // A panicking worker is isolated exactly like an
                    // erroring one.
                    if let Some((task_id, worker_id)) = spawned.remove(&join_err.id()) {
                        hlog_warn!("SwarmScheduler: task {} panicked: {}", task_id, join_err);
                        results.push(TaskResult::failed(
                            &task_id,
                            &worker_id,
                            format!("worker panicked: {}", join_err),
                            stage_started.elapsed(),
                        ));
                    }
                }
            }
        }
        results
    }
}
