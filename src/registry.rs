//! Worker registration and dispatch.
//!
//! Workers are registered once under string ids and resolved through
//! [`WorkerRegistry::resolve`], which returns a checked handle instead of
//! probing a mutable map. [`RegistryWorker`] adapts a registry to the
//! scheduler's [`Worker`] seam: each sub-task is dispatched to the worker
//! named by its `worker` field, and an unknown id becomes that task's
//! isolated failure rather than a run abort.
//!
//! [`CommandWorker`] is the built-in subprocess worker used by the CLI:
//! one child process per invocation, task description on argv, dependency
//! context on stdin, stdout captured as the result payload.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::core::SubTask;
use crate::error::{Error, Result};
use crate::swarm::{DependencyContext, Worker, WorkerOutput};
use crate::{hlog_debug, hlog_trace};

/// Registry of named workers.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker under an id, replacing any previous registration.
    pub fn register(&mut self, id: &str, worker: Arc<dyn Worker>) {
        hlog_debug!("WorkerRegistry: registered worker '{}'", id);
        self.workers.insert(id.to_string(), worker);
    }

    /// Resolve a worker id to a handle.
    pub fn resolve(&self, id: &str) -> Result<Arc<dyn Worker>> {
        self.workers
            .get(id)
            .cloned()
            .ok_or_else(|| Error::WorkerNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.workers.contains_key(id)
    }

    /// Registered worker ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("workers", &self.ids())
            .finish()
    }
}

/// Adapts a [`WorkerRegistry`] to the scheduler's [`Worker`] seam by
/// dispatching on each sub-task's `worker` field.
pub struct RegistryWorker {
    registry: Arc<WorkerRegistry>,
}

impl RegistryWorker {
    pub fn new(registry: Arc<WorkerRegistry>) -> Self {
        Self { registry }
    }
}

impl Worker for RegistryWorker {
    fn invoke(
        &self,
        task: SubTask,
        deps: DependencyContext,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<WorkerOutput>> {
        match self.registry.resolve(&task.worker) {
            Ok(worker) => worker.invoke(task, deps, cancel),
            Err(e) => async move { Err(e) }.boxed(),
        }
    }
}

/// A worker that runs a configured command per invocation.
///
/// The task description is appended to the argument list; the rendered
/// dependency context is written to the child's stdin; trimmed stdout is
/// the result payload. Cancellation kills the child.
pub struct CommandWorker {
    program: String,
    args: Vec<String>,
}

impl CommandWorker {
    /// Create a command worker, verifying the binary is available.
    pub fn new(program: &str, args: Vec<String>) -> Result<Self> {
        which::which(program)
            .map_err(|_| Error::WorkerUnavailable(format!("{} not found in PATH", program)))?;
        Ok(Self {
            program: program.to_string(),
            args,
        })
    }

    /// Parse a shell-ish command line: first token is the program, the
    /// rest are arguments.
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| Error::Validation("empty worker command".to_string()))?;
        Self::new(&program, parts.collect())
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Worker for CommandWorker {
    fn invoke(
        &self,
        task: SubTask,
        deps: DependencyContext,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<WorkerOutput>> {
        let program = self.program.clone();
        let args = self.args.clone();
        async move {
            hlog_trace!("CommandWorker: {} invoking {} for task {}", program, task.worker, task.id);
            let mut command = Command::new(&program);
            command
                .args(&args)
                .arg(&task.description)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = command.spawn()?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(deps.render().as_bytes()).await?;
                // Close stdin so workers reading to EOF can proceed.
                drop(stdin);
            }

            tokio::select! {
                output = child.wait_with_output() => {
                    let output = output?;
                    if output.status.success() {
                        let stdout = String::from_utf8_lossy(&output.stdout)
                            .trim_end()
                            .to_string();
                        Ok(WorkerOutput::new(stdout, 1))
                    } else {
                        let stderr = String::from_utf8_lossy(&output.stderr)
                            .trim_end()
                            .to_string();
                        Err(Error::Validation(format!(
                            "{} exited with {}: {}",
                            program, output.status, stderr
                        )))
                    }
                }
                _ = cancel.cancelled() => {
                    // kill_on_drop reaps the child.
                    Err(Error::Validation(format!(
                        "{} cancelled for task {}",
                        program, task.id
                    )))
                }
            }
        }
        .boxed()
    }
}
