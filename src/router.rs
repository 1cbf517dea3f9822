//! Model selection for task specs.
//!
//! The router filters the catalog by hard requirements and budget, scores
//! the survivors with catalog suitability blended against observed rolling
//! statistics, and returns a primary pick plus an ordered fallback list.
//!
//! The router never fails for "no great match": as long as the catalog is
//! non-empty it returns *some* selection, degrading through two tiers
//! (enabled profiles, then all profiles) and finally to unfiltered catalog
//! heads. This fail-soft posture is deliberate and load-bearing — callers
//! of the final degrade tier are expected to re-validate capability fit.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::ModelCatalog;
use crate::core::{ModelProfile, Priority, TaskType};
use crate::metrics::MetricsStore;
use crate::{hlog_debug, Error, Result};

/// Default number of candidates returned per selection.
pub const DEFAULT_MAX_CANDIDATES: usize = 3;

/// Latency floor for the latency-priority boost, milliseconds. Models
/// faster than this receive no extra credit.
const LATENCY_BOOST_FLOOR_MS: f64 = 200.0;

/// Reliability floor: a model with a bad error history is demoted, never
/// discarded outright by score alone.
const RELIABILITY_FLOOR: f64 = 0.2;

/// Capabilities a task can require of a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRequirements {
    #[serde(default)]
    pub tools: bool,
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub long_context: bool,
    #[serde(default)]
    pub min_context_tokens: Option<u32>,
}

/// Optional budget constraints on a routing request.
///
/// Cost and token ceilings are accepted fields but only the p95 latency
/// ceiling is enforced as a hard filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default)]
    pub max_cost_per_1k: Option<f64>,
    #[serde(default)]
    pub max_p95_latency_ms: Option<u64>,
    #[serde(default)]
    pub max_input_tokens: Option<u32>,
}

/// A routing request: what kind of work, what to optimize for, and any
/// hard requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_type: TaskType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub budget: Option<Budget>,
    #[serde(default)]
    pub required: CapabilityRequirements,
}

impl TaskSpec {
    pub fn new(task_type: TaskType) -> Self {
        Self {
            task_type,
            priority: Priority::default(),
            budget: None,
            required: CapabilityRequirements::default(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_requirements(mut self, required: CapabilityRequirements) -> Self {
        self.required = required;
        self
    }

    /// Whether a profile satisfies this spec's hard requirements and the
    /// enforced part of its budget.
    fn admits(&self, profile: &ModelProfile) -> bool {
        if self.required.tools && !profile.supports_tools {
            return false;
        }
        if self.required.json && !profile.supports_json {
            return false;
        }
        if self.required.long_context && !profile.supports_long_context {
            return false;
        }
        if let Some(min_context) = self.required.min_context_tokens {
            if profile.max_context_tokens < min_context {
                return false;
            }
        }
        if let Some(budget) = &self.budget {
            if let Some(ceiling) = budget.max_p95_latency_ms {
                if profile.latency_p95_ms > ceiling {
                    return false;
                }
            }
        }
        true
    }
}

/// Knobs for one `select` call.
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// Operator override: always wins when it names a known profile, even
    /// over hard requirements.
    pub override_model: Option<String>,
    /// Cap on the candidate list length (default 3, minimum 1).
    pub max_candidates: Option<usize>,
}

/// The result of routing: a primary pick plus ordered fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSelection {
    pub primary: ModelProfile,
    /// Ordered candidates, primary included, best first.
    pub candidates: Vec<ModelProfile>,
    /// `"manual_override"` or `"auto:<task_type>:<priority>"`.
    pub reason: String,
}

/// Picks the best-fit backend model for a task spec.
///
/// Reads the catalog and the metrics store; never mutates either.
pub struct ModelRouter {
    catalog: Arc<ModelCatalog>,
    metrics: Arc<MetricsStore>,
}

impl ModelRouter {
    pub fn new(catalog: Arc<ModelCatalog>, metrics: Arc<MetricsStore>) -> Self {
        Self { catalog, metrics }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Select a model for the given spec.
    ///
    /// Fails only when the catalog is empty. An override id that does not
    /// resolve to a known profile falls through to normal scoring.
    pub async fn select(&self, spec: &TaskSpec, options: &SelectOptions) -> Result<ModelSelection> {
        if self.catalog.is_empty() {
            return Err(Error::NoModelsConfigured);
        }

        if let Some(override_id) = &options.override_model {
            if let Some(profile) = self.catalog.get(override_id) {
                hlog_debug!("ModelRouter: manual override to {}", override_id);
                return Ok(ModelSelection {
                    primary: profile.clone(),
                    candidates: vec![profile.clone()],
                    reason: "manual_override".to_string(),
                });
            }
            hlog_debug!(
                "ModelRouter: override '{}' not in catalog, falling through to scoring",
                override_id
            );
        }

        let max_candidates = options
            .max_candidates
            .unwrap_or(DEFAULT_MAX_CANDIDATES)
            .max(1);
        let reason = format!("auto:{}:{}", spec.task_type, spec.priority);

        // Tier 1: enabled-by-default profiles that satisfy the spec.
        // Tier 2: widen to all profiles under the same filters, so a match
        // exists whenever any profile satisfies hard requirements.
        let mut eligible: Vec<&ModelProfile> = self
            .catalog
            .profiles()
            .iter()
            .filter(|p| p.enabled_by_default && spec.admits(p))
            .collect();
        if eligible.is_empty() {
            eligible = self
                .catalog
                .profiles()
                .iter()
                .filter(|p| spec.admits(p))
                .collect();
        }

        // Nothing satisfies the requirements at all: degrade to unfiltered
        // catalog heads rather than failing. Callers re-validate fit.
        if eligible.is_empty() {
            hlog_debug!(
                "ModelRouter: no profile satisfies requirements for {}, degrading to catalog heads",
                spec.task_type
            );
            let candidates: Vec<ModelProfile> = self
                .catalog
                .profiles()
                .iter()
                .take(max_candidates)
                .cloned()
                .collect();
            return Ok(ModelSelection {
                primary: candidates[0].clone(),
                candidates,
                reason,
            });
        }

        let mut scored: Vec<(f64, &ModelProfile)> = Vec::with_capacity(eligible.len());
        for profile in eligible {
            let score = self.score(profile, spec).await;
            scored.push((score, profile));
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let candidates: Vec<ModelProfile> = scored
            .iter()
            .take(max_candidates)
            .map(|(_, p)| (*p).clone())
            .collect();
        hlog_debug!(
            "ModelRouter: {} -> {} ({} candidates)",
            reason,
            candidates[0].id,
            candidates.len()
        );
        Ok(ModelSelection {
            primary: candidates[0].clone(),
            candidates,
            reason,
        })
    }

    /// score = suitability × reliability × priority boost.
    async fn score(&self, profile: &ModelProfile, spec: &TaskSpec) -> f64 {
        let suitability = profile.suitability_for(spec.task_type);
        let stats = self.metrics.get(&profile.id, spec.task_type).await;

        let reliability = match &stats {
            Some(s) if s.calls > 0 => (1.0 - s.error_rate()).clamp(RELIABILITY_FLOOR, 1.0),
            _ => 1.0,
        };

        let boost = match spec.priority {
            Priority::Quality => 1.0,
            Priority::Latency => {
                let p50 = stats
                    .as_ref()
                    .map(|s| s.ewma_latency_ms)
                    .unwrap_or(profile.latency_p50_ms as f64);
                1000.0 / p50.max(LATENCY_BOOST_FLOOR_MS)
            }
            Priority::Cost => {
                let cost = profile.total_cost_per_1k();
                if cost > 0.0 {
                    1.0 / cost
                } else {
                    1.0
                }
            }
        };

        suitability * reliability * boost
    }
}
