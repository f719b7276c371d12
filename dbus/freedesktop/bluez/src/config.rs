//! Scenario configuration, read from an optional TOML file.
//!
//! ```toml
//! pairing_timeout_secs = 60
//! settle_delay_secs = 5
//! default_adapter = "hci0"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Seconds to wait for a pair request to complete.
    pub pairing_timeout_secs: u64,
    /// Seconds to let the stack settle after bulk unpairing or renaming.
    pub settle_delay_secs: u64,
    /// Adapter used when none is given on the command line.
    pub default_adapter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pairing_timeout_secs: 60,
            settle_delay_secs: 5,
            default_adapter: "hci0".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_secs(self.pairing_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}
