//! Model backend descriptors.
//!
//! A [`ModelProfile`] describes one backend model: identity, cost and
//! latency bands, capability flags, and per-task-type suitability weights.
//! Profiles are loaded once at startup and are read-only afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The kinds of work a model can be routed for.
///
/// This is a closed set: routing weights, rolling statistics, and task
/// specs are all keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    TradingDecision,
    MarketAnalysis,
    Search,
    Summarization,
    Extraction,
}

impl TaskType {
    /// All task types, in declaration order.
    pub fn all() -> [TaskType; 5] {
        [
            TaskType::TradingDecision,
            TaskType::MarketAnalysis,
            TaskType::Search,
            TaskType::Summarization,
            TaskType::Extraction,
        ]
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::TradingDecision => write!(f, "trading_decision"),
            TaskType::MarketAnalysis => write!(f, "market_analysis"),
            TaskType::Search => write!(f, "search"),
            TaskType::Summarization => write!(f, "summarization"),
            TaskType::Extraction => write!(f, "extraction"),
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "trading_decision" => Ok(TaskType::TradingDecision),
            "market_analysis" => Ok(TaskType::MarketAnalysis),
            "search" => Ok(TaskType::Search),
            "summarization" => Ok(TaskType::Summarization),
            "extraction" => Ok(TaskType::Extraction),
            other => Err(format!("unknown task type: {}", other)),
        }
    }
}

/// What the caller wants the router to optimize for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Best-fit model regardless of speed or cost.
    #[default]
    Quality,
    /// Prefer models with low observed or advertised p50 latency.
    Latency,
    /// Prefer models with low per-token cost.
    Cost,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Quality => write!(f, "quality"),
            Priority::Latency => write!(f, "latency"),
            Priority::Cost => write!(f, "cost"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "quality" => Ok(Priority::Quality),
            "latency" => Ok(Priority::Latency),
            "cost" => Ok(Priority::Cost),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// Suitability weight used when a profile carries no weight for a task type.
pub const DEFAULT_SUITABILITY: f64 = 0.5;

/// Static descriptor of one backend model.
///
/// Immutable after load; owned by the [`crate::catalog::ModelCatalog`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Opaque identifier used in routing, stats, and overrides.
    pub id: String,
    /// Provider tag (e.g. "anthropic", "openai", "local").
    pub provider: String,
    /// Backend model name as the provider knows it.
    pub model: String,
    /// Whether this profile participates in routing by default.
    #[serde(default = "default_enabled")]
    pub enabled_by_default: bool,
    /// Cost per 1k input tokens, in dollars.
    #[serde(default)]
    pub input_cost_per_1k: f64,
    /// Cost per 1k output tokens, in dollars.
    #[serde(default)]
    pub output_cost_per_1k: f64,
    /// Advertised median latency, milliseconds.
    pub latency_p50_ms: u64,
    /// Advertised 95th-percentile latency, milliseconds.
    pub latency_p95_ms: u64,
    #[serde(default)]
    pub supports_tools: bool,
    #[serde(default)]
    pub supports_json: bool,
    #[serde(default)]
    pub supports_long_context: bool,
    /// Maximum context window, tokens.
    pub max_context_tokens: u32,
    /// Per-task-type affinity weights, each in [0, 1].
    #[serde(default)]
    pub suitability: HashMap<TaskType, f64>,
}

fn default_enabled() -> bool {
    true
}

impl ModelProfile {
    /// The suitability weight for a task type, defaulting to
    /// [`DEFAULT_SUITABILITY`] when the profile carries no weight for it.
    pub fn suitability_for(&self, task_type: TaskType) -> f64 {
        self.suitability
            .get(&task_type)
            .copied()
            .unwrap_or(DEFAULT_SUITABILITY)
    }

    /// Combined input + output cost per 1k tokens.
    pub fn total_cost_per_1k(&self) -> f64 {
        self.input_cost_per_1k + self.output_cost_per_1k
    }
}
