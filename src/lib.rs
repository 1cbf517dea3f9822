pub mod catalog;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod swarm;

pub use catalog::ModelCatalog;
pub use config::Config;
pub use error::{Error, Result};
pub use metrics::{CallOutcome, MetricsStore, ModelCall, RollingStats};
pub use router::{ModelRouter, ModelSelection, SelectOptions, TaskSpec};
pub use swarm::{ExecutionTrace, ParallelizationMetrics, SwarmScheduler, Worker};
