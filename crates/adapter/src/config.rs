//! Adapter configuration

use serde::Deserialize;

/// Last-resource commit optimisation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LrcoConfig {
    /// Enlist the store as the coordinator's last resource. When disabled the
    /// store joins coordinator transactions through its own synchronization.
    pub one_phase_commit: bool,
}

impl LrcoConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn with_one_phase_commit(mut self, enabled: bool) -> Self {
        self.one_phase_commit = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_by_default() {
        assert!(!LrcoConfig::default().one_phase_commit);
        assert!(!LrcoConfig::from_json("{}").unwrap().one_phase_commit);
    }

    #[test]
    fn test_from_json() {
        let config = LrcoConfig::from_json(r#"{"one_phase_commit": true}"#).unwrap();
        assert_eq!(config, LrcoConfig::default().with_one_phase_commit(true));
        assert!(LrcoConfig::from_json(r#"{"one_phase_commit": "yes"}"#).is_err());
    }
}
