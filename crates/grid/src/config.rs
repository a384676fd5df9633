//! Grid configuration

use crate::error::{GridError, Result};
use serde::Deserialize;

/// Configuration for a cache
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Cache name, used in logs and errors
    pub name: String,

    /// Reject commits that overwrite entries changed by someone else
    pub conflict_detection: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            name: "grid".to_string(),
            conflict_detection: true,
        }
    }
}

impl GridConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| GridError::Config(e.to_string()))
    }

    pub fn with_conflict_detection(mut self, enabled: bool) -> Self {
        self.conflict_detection = enabled;
        self
    }
}
