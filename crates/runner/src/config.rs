//! Runner configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use rigging_engine::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::error::{RunnerError, RunnerResult};

pub const ENV_CASE_TIMEOUT_MS: &str = "RIGGING_CASE_TIMEOUT_MS";
pub const ENV_FAIL_FAST: &str = "RIGGING_FAIL_FAST";
pub const ENV_OUTPUT_DIR: &str = "RIGGING_OUTPUT_DIR";

/// Configuration for the suite runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Fixture lifecycle limits
    pub engine: EngineConfig,

    /// Limit on setup plus body for each case (None = unbounded)
    pub case_timeout_ms: Option<u64>,

    /// Stop running cases after the first failure
    pub fail_fast: bool,

    /// Output directory for results
    pub output_dir: PathBuf,

    pub log: LogConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            case_timeout_ms: None,
            fail_fast: false,
            output_dir: PathBuf::from("test-results"),
            log: LogConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file, falling back to defaults if it is missing
    pub fn load(path: &Path) -> RunnerResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| RunnerError::Config(format!("{}: {}", path.display(), e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `RIGGING_*` overrides from the process environment
    pub fn apply_env(&mut self) -> RunnerResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> RunnerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_CASE_TIMEOUT_MS) {
            let ms = raw.trim().parse::<u64>().map_err(|e| {
                RunnerError::Config(format!("{}={:?}: {}", ENV_CASE_TIMEOUT_MS, raw, e))
            })?;
            self.case_timeout_ms = Some(ms);
        }

        if let Some(raw) = lookup(ENV_FAIL_FAST) {
            self.fail_fast = parse_flag(&raw).ok_or_else(|| {
                RunnerError::Config(format!("{}={:?}: expected a boolean", ENV_FAIL_FAST, raw))
            })?;
        }

        if let Some(raw) = lookup(ENV_OUTPUT_DIR) {
            if !raw.is_empty() {
                self.output_dir = PathBuf::from(raw);
            }
        }

        Ok(())
    }

    pub fn case_timeout(&self) -> Option<Duration> {
        self.case_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
