//! Coordinator configuration

use crate::error::Result;
use serde::Deserialize;
use std::time::Duration;

/// Format id stamped on generated xids
pub const DEFAULT_FORMAT_ID: i32 = 131077;

/// Configuration for the transaction manager
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Allow more than one last resource per transaction. Off by default:
    /// a second last resource cannot be committed atomically with the first.
    pub allow_multiple_last_resources: bool,

    /// Transaction timeout in seconds; zero disables the timeout
    pub default_timeout_secs: u64,

    pub format_id: i32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            allow_multiple_last_resources: false,
            default_timeout_secs: 60,
            format_id: DEFAULT_FORMAT_ID,
        }
    }
}

impl CoordinatorConfig {
    /// Parse from JSON, missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_multiple_last_resources(mut self, allow: bool) -> Self {
        self.allow_multiple_last_resources = allow;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_secs = timeout.as_secs();
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.default_timeout_secs > 0).then(|| Duration::from_secs(self.default_timeout_secs))
    }
}
