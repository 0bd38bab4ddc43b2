//! Engine configuration.
//!
//! Loaded from a small TOML file when present; every field has a default so
//! an absent or empty file yields a working configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Tunables for the compaction and audit-retention policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Intraday entries newer than this many days survive compaction
    /// regardless of the latest-per-date rule.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Number of most-recent audit records kept by compaction.
    #[serde(default = "default_audit_cap")]
    pub audit_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            audit_cap: default_audit_cap(),
        }
    }
}

const fn default_retention_days() -> u32 {
    30
}

const fn default_audit_cap() -> usize {
    10
}

impl EngineConfig {
    /// Read configuration from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Corrupt`] when the file exists but cannot be
    /// read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, LedgerError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|e| LedgerError::Corrupt {
            key: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| LedgerError::Corrupt {
            key: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let config = EngineConfig::default();
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.audit_cap, 10);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str("retention_days = 7").expect("parse");
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.audit_cap, 10);
    }

    #[test]
    fn empty_toml_is_default() {
        let config: EngineConfig = toml::from_str("").expect("parse");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn missing_file_is_default() {
        let config = EngineConfig::from_path(Path::new("/nonexistent/rigledger.toml"))
            .expect("missing file falls back to defaults");
        assert_eq!(config, EngineConfig::default());
    }
}
