//! Engine configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine-wide lifecycle limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default time a factory gets to yield (None = unbounded).
    /// A fixture's own `with_timeout` takes precedence.
    pub setup_timeout_ms: Option<u64>,

    /// Time a resumed factory gets to finish its cleanup (None = unbounded)
    pub teardown_timeout_ms: Option<u64>,
}

impl EngineConfig {
    /// Load configuration from file, falling back to defaults if it is missing
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn setup_timeout(&self) -> Option<Duration> {
        self.setup_timeout_ms.map(Duration::from_millis)
    }

    pub fn teardown_timeout(&self) -> Option<Duration> {
        self.teardown_timeout_ms.map(Duration::from_millis)
    }
}
