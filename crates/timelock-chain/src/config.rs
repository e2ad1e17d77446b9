//! Unlock configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use timelock_crypto::kernel::KernelSelector;

use crate::error::{ChainError, Result};

/// Kernel invocations faster than this double the next batch
pub const DEFAULT_BATCH_THRESHOLD_MS: u64 = 25;

/// Order in which a chain set visits its chains while unlocking
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockPolicy {
    /// Last chain first; earlier chains are only computed when needed
    #[default]
    BackwardFirst,
    /// First chain first; every chain ends up solved
    ForwardFirst,
}

/// Per-engine stepping configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Batch-doubling threshold in milliseconds
    pub batch_threshold_ms: u64,
    /// Which kernel performs the hashing
    pub kernel: KernelSelector,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            batch_threshold_ms: DEFAULT_BATCH_THRESHOLD_MS,
            kernel: KernelSelector::default(),
        }
    }
}

impl StepConfig {
    /// Get batch threshold as Duration
    pub fn batch_threshold(&self) -> Duration {
        Duration::from_millis(self.batch_threshold_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_threshold_ms == 0 {
            return Err(ChainError::InvalidConfig(
                "batch_threshold_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Chain-set unlock configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnlockConfig {
    /// Traversal used by [`ChainSet::unlock`](crate::ChainSet::unlock)
    pub policy: UnlockPolicy,
    /// Stepping configuration applied to every chain
    pub step: StepConfig,
}

impl UnlockConfig {
    /// Create with a traversal policy
    pub fn with_policy(policy: UnlockPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.step.validate()
    }
}
