//! CLI configuration

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use timelock_chain::UnlockConfig;

/// CLI configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Algorithm used by `new` when none is given
    pub default_algorithm: String,
    /// Chains created by `new` when no count is given
    pub default_chains: usize,
    /// Steps per chain created by `new` when no count is given
    pub default_steps: u64,
    /// Length of one unlock slice in seconds; state is saved between slices
    pub slice_secs: u64,
    /// Unlock policy and stepping
    pub unlock: UnlockConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            default_algorithm: "sha256".to_string(),
            default_chains: 4,
            default_steps: 1_000_000,
            slice_secs: 1,
            unlock: UnlockConfig::default(),
        }
    }
}

impl CliConfig {
    /// Default location: `<config dir>/timelock/config.toml`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("timelock");
        path.push("config.toml");
        path
    }

    /// Load config from file, or defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.slice_secs == 0 {
            anyhow::bail!("slice_secs must be > 0");
        }
        self.unlock.validate()?;
        Ok(())
    }

    /// Unlock slice as Duration
    pub fn slice(&self) -> Duration {
        Duration::from_secs(self.slice_secs)
    }
}
