//! Coordination settings

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Settings for the coordination core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinationSettings {
    /// Quiet period before a history snapshot is committed
    pub history_debounce_ms: u64,

    /// How long range notifications are ignored after an undo/redo
    pub restore_settle_ms: u64,

    /// Default log level for the replay tool
    pub log_level: String,
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        Self {
            history_debounce_ms: 500,
            restore_settle_ms: 500,
            log_level: "info".to_string(),
        }
    }
}

impl CoordinationSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn history_debounce(&self) -> Duration {
        Duration::from_millis(self.history_debounce_ms)
    }

    pub fn restore_settle(&self) -> Duration {
        Duration::from_millis(self.restore_settle_ms)
    }

    fn validate(&self) -> Result<()> {
        match self.log_level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(CoreError::Settings(format!("unknown log level '{}'", other))),
        }
    }
}
