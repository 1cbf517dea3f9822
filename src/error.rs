use std::time::Duration;

use thiserror::Error;

use crate::swarm::ExecutionTrace;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No model profiles configured")]
    NoModelsConfigured,

    #[error("Worker not registered: {0}")]
    WorkerNotFound(String),

    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Task {task} depends on unknown task {reference}")]
    UnresolvedDependency { task: String, reference: String },

    #[error("Circular dependency among tasks: {remaining:?}")]
    CircularDependency { remaining: Vec<String> },

    #[error("Deadline of {deadline:?} exceeded")]
    DeadlineExceeded {
        deadline: Duration,
        /// Stages that finished before the deadline fired, for diagnostics.
        partial: Box<ExecutionTrace>,
    },

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

pub type Result<T> = std::result::Result<T, Error>;
