//! Engine configuration
//!
//! A small JSON file tunes the revert timeout and lets a platform rename the
//! GPIO lines behind individual signals. A missing file means defaults; a
//! malformed file is an error so a bad deployment is caught at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use mtm_error::{MtmError, Result};

use crate::constants::{DEFAULT_REVERT_TIMEOUT, MAX_REVERT_TIMEOUT_SECS, MIN_REVERT_TIMEOUT_SECS};

/// Default location consulted when no --config flag is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mtmd/config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Idle seconds before all outstanding overrides revert
    pub revert_timeout_secs: u64,
    /// Per-signal GPIO line name overrides, keyed by the default line name
    pub gpio_line_overrides: HashMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            revert_timeout_secs: DEFAULT_REVERT_TIMEOUT.as_secs(),
            gpio_line_overrides: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.revert_timeout_secs < MIN_REVERT_TIMEOUT_SECS
            || self.revert_timeout_secs > MAX_REVERT_TIMEOUT_SECS
        {
            return Err(MtmError::config(format!(
                "revert_timeout_secs out of range: {} ({}-{})",
                self.revert_timeout_secs, MIN_REVERT_TIMEOUT_SECS, MAX_REVERT_TIMEOUT_SECS
            )));
        }
        for (from, to) in &self.gpio_line_overrides {
            if from.is_empty() || to.is_empty() {
                return Err(MtmError::config("empty GPIO line override"));
            }
            if to.contains('/') {
                return Err(MtmError::config(format!(
                    "GPIO line override contains a path separator: {}",
                    to
                )));
            }
        }
        Ok(())
    }

    pub fn revert_timeout(&self) -> Duration {
        Duration::from_secs(self.revert_timeout_secs)
    }

    /// Resolve a default line name through the override table.
    pub fn gpio_line<'a>(&'a self, default_name: &'a str) -> &'a str {
        self.gpio_line_overrides
            .get(default_name)
            .map(String::as_str)
            .unwrap_or(default_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing() {
        let config = EngineConfig::load(Path::new("/nonexistent/mtmd/config.json")).unwrap();
        assert_eq!(config.revert_timeout_secs, 60);
        assert!(config.gpio_line_overrides.is_empty());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig = serde_json::from_str("{\"revert_timeout_secs\": 120}").unwrap();
        assert_eq!(config.revert_timeout_secs, 120);
        assert!(config.gpio_line_overrides.is_empty());
    }

    #[test]
    fn rejects_out_of_range_timeout() {
        let config = EngineConfig {
            revert_timeout_secs: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_path_separator_in_override() {
        let mut config = EngineConfig::default();
        config
            .gpio_line_overrides
            .insert("power_button".into(), "../etc".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn line_override_resolution() {
        let mut config = EngineConfig::default();
        config
            .gpio_line_overrides
            .insert("power_button".into(), "fp_power_btn".into());
        assert_eq!(config.gpio_line("power_button"), "fp_power_btn");
        assert_eq!(config.gpio_line("reset_button"), "reset_button");
    }
}
