//! The model profile catalog.
//!
//! Profiles are loaded once at startup (from the built-in set or a TOML
//! file), optionally reshaped by an operator allow-list, and read-only for
//! the rest of the process lifetime. The catalog is safe for unsynchronized
//! concurrent reads.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::core::{ModelProfile, TaskType};
use crate::{hlog_debug, Error, Result};

/// On-disk shape of a catalog file: a list of `[[models]]` tables.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    models: Vec<ModelProfile>,
}

/// Read-only collection of the model profiles available for routing.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    profiles: Vec<ModelProfile>,
}

impl ModelCatalog {
    /// Build a catalog from explicit profiles.
    ///
    /// Rejects duplicate profile ids; an empty catalog is allowed here and
    /// only fails at routing time.
    pub fn new(profiles: Vec<ModelProfile>) -> Result<Self> {
        let mut seen = HashSet::new();
        for profile in &profiles {
            if !seen.insert(profile.id.clone()) {
                return Err(Error::Validation(format!(
                    "Duplicate model profile id: {}",
                    profile.id
                )));
            }
        }
        Ok(Self { profiles })
    }

    /// Load a catalog from a TOML file with `[[models]]` entries.
    pub fn from_file(path: &Path) -> Result<Self> {
        hlog_debug!("ModelCatalog::from_file path={}", path.display());
        let file: CatalogFile = toml::from_str(&fs::read_to_string(path)?)?;
        Self::new(file.models)
    }

    /// The built-in profile set, used when no catalog file is configured.
    pub fn builtin() -> Self {
        let profiles = vec![
            ModelProfile {
                id: "claude-sonnet".to_string(),
                provider: "anthropic".to_string(),
                model: "claude-sonnet-4".to_string(),
                enabled_by_default: true,
                input_cost_per_1k: 0.003,
                output_cost_per_1k: 0.015,
                latency_p50_ms: 900,
                latency_p95_ms: 2500,
                supports_tools: true,
                supports_json: true,
                supports_long_context: true,
                max_context_tokens: 200_000,
                suitability: HashMap::from([
                    (TaskType::TradingDecision, 0.9),
                    (TaskType::MarketAnalysis, 0.85),
                    (TaskType::Summarization, 0.8),
                    (TaskType::Extraction, 0.75),
                ]),
            },
            ModelProfile {
                id: "claude-haiku".to_string(),
                provider: "anthropic".to_string(),
                model: "claude-haiku-3-5".to_string(),
                enabled_by_default: true,
                input_cost_per_1k: 0.0008,
                output_cost_per_1k: 0.004,
                latency_p50_ms: 350,
                latency_p95_ms: 1100,
                supports_tools: true,
                supports_json: true,
                supports_long_context: false,
                max_context_tokens: 200_000,
                suitability: HashMap::from([
                    (TaskType::Search, 0.8),
                    (TaskType::Summarization, 0.85),
                    (TaskType::Extraction, 0.85),
                    (TaskType::MarketAnalysis, 0.6),
                ]),
            },
            ModelProfile {
                id: "gpt-4o".to_string(),
                provider: "openai".to_string(),
                model: "gpt-4o".to_string(),
                enabled_by_default: true,
                input_cost_per_1k: 0.0025,
                output_cost_per_1k: 0.01,
                latency_p50_ms: 800,
                latency_p95_ms: 2200,
                supports_tools: true,
                supports_json: true,
                supports_long_context: true,
                max_context_tokens: 128_000,
                suitability: HashMap::from([
                    (TaskType::TradingDecision, 0.85),
                    (TaskType::MarketAnalysis, 0.8),
                    (TaskType::Search, 0.7),
                ]),
            },
            ModelProfile {
                id: "local-llama".to_string(),
                provider: "local".to_string(),
                model: "llama-3-8b".to_string(),
                enabled_by_default: false,
                input_cost_per_1k: 0.0,
                output_cost_per_1k: 0.0,
                latency_p50_ms: 250,
                latency_p95_ms: 900,
                supports_tools: false,
                supports_json: true,
                supports_long_context: false,
                max_context_tokens: 8_192,
                suitability: HashMap::from([
                    (TaskType::Summarization, 0.6),
                    (TaskType::Extraction, 0.6),
                ]),
            },
        ];
        // Ids above are distinct by construction.
        Self { profiles }
    }

    /// Apply an operator allow-list of comma-separated model ids.
    ///
    /// Listed profiles become enabled-by-default, everything else is
    /// disabled. Applied once at startup; a blank list is a no-op.
    pub fn with_allowlist(mut self, allowlist: &str) -> Self {
        let ids: HashSet<&str> = allowlist
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if ids.is_empty() {
            return self;
        }
        for profile in &mut self.profiles {
            profile.enabled_by_default = ids.contains(profile.id.as_str());
        }
        self
    }

    /// Look up a profile by id.
    pub fn get(&self, id: &str) -> Option<&ModelProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// All profiles, in load order.
    pub fn profiles(&self) -> &[ModelProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
