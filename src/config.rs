use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::router::DEFAULT_MAX_CANDIDATES;
use crate::{hlog_debug, Error, Result};

/// Default swarm deadline when neither config nor CLI supplies one.
pub const DEFAULT_DEADLINE_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Comma-separated model ids; when set, flips which catalog entries
    /// are enabled by default. Applied once at startup.
    pub model_allowlist: Option<String>,
    /// Cap on candidates per routing call.
    pub max_candidates: Option<usize>,
    /// Wall-clock budget for swarm execution, milliseconds.
    pub deadline_ms: Option<u64>,
    /// Path to a TOML catalog file; the built-in catalog is used when
    /// absent.
    pub models_file: Option<String>,
}

impl Config {
    pub fn hive_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".hive"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::hive_dir()?.join("hive.toml"))
    }

    pub fn effective_max_candidates(&self) -> usize {
        self.max_candidates.unwrap_or(DEFAULT_MAX_CANDIDATES).max(1)
    }

    pub fn effective_deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms.unwrap_or(DEFAULT_DEADLINE_MS))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        hlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            hlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        hlog_debug!(
            "Config loaded: allowlist={:?}, max_candidates={:?}, deadline_ms={:?}, models_file={:?}",
            config.model_allowlist,
            config.max_candidates,
            config.deadline_ms,
            config.models_file
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let hive_dir = Self::hive_dir()?;
        hlog_debug!("Config::save hive_dir={}", hive_dir.display());
        if !hive_dir.exists() {
            fs::create_dir_all(&hive_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        hlog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}
