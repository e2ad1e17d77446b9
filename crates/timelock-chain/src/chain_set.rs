//! Daisy-chained sets of puzzles
//!
//! Chain `k`'s seed is published only XOR-masked with chain `k - 1`'s secret,
//! so the chains have to be solved in order and the total delay is the sum
//! of the individual ones. Chain 0's seed stays in the clear; whoever
//! controls it controls when solving can start.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use timelock_crypto::kernel::HashAlgorithm;

use crate::config::{UnlockConfig, UnlockPolicy};
use crate::engine::SequentialHashEngine;
use crate::error::{ChainError, Result};
use crate::provenance::SecretProvenance;

/// An ordered set of daisy-chained puzzles
#[derive(Clone, Debug)]
pub struct ChainSet {
    chains: Vec<SequentialHashEngine>,
    config: UnlockConfig,
}

impl ChainSet {
    /// Create `num_chains` chains of `n` steps each with random seeds
    pub fn new(num_chains: usize, n: u64, algorithm: Arc<HashAlgorithm>) -> Result<Self> {
        let chains = (0..num_chains)
            .map(|_| SequentialHashEngine::random(n, algorithm.clone()))
            .collect();
        Self::from_chains(chains)
    }

    /// Create one chain of `n` steps per caller-supplied seed
    pub fn with_seeds(n: u64, algorithm: Arc<HashAlgorithm>, seeds: Vec<Vec<u8>>) -> Result<Self> {
        let chains = seeds
            .into_iter()
            .map(|iv| SequentialHashEngine::new(n, algorithm.clone(), iv))
            .collect::<Result<Vec<_>>>()?;
        Self::from_chains(chains)
    }

    /// Assemble a set from existing engines
    pub fn from_chains(chains: Vec<SequentialHashEngine>) -> Result<Self> {
        if chains.is_empty() {
            return Err(ChainError::NoChains);
        }

        Ok(Self {
            chains,
            config: UnlockConfig::default(),
        })
    }

    /// Apply an unlock configuration to the set and every chain
    pub fn with_config(mut self, config: UnlockConfig) -> Result<Self> {
        self.set_config(config)?;
        Ok(self)
    }

    /// Replace the unlock configuration
    pub fn set_config(&mut self, config: UnlockConfig) -> Result<()> {
        config.validate()?;
        for chain in &mut self.chains {
            chain.set_step_config(config.step.clone());
        }
        self.config = config;
        Ok(())
    }

    /// Current unlock configuration
    pub fn config(&self) -> &UnlockConfig {
        &self.config
    }

    /// Chains in order
    pub fn chains(&self) -> &[SequentialHashEngine] {
        &self.chains
    }

    /// Number of chains
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Always false: a set has at least one chain
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// The set's secret: the last chain's secret
    pub fn secret(&self) -> Option<&[u8]> {
        self.chains.last().and_then(SequentialHashEngine::secret)
    }

    /// Steps completed across all chains
    pub fn steps_done(&self) -> u64 {
        self.chains.iter().map(SequentialHashEngine::i).sum()
    }

    /// Steps required across all chains
    pub fn steps_total(&self) -> u64 {
        self.chains.iter().map(SequentialHashEngine::n).sum()
    }

    /// Hash steps computed by this instance across all chains
    pub fn hashes_computed(&self) -> u64 {
        self.chains
            .iter()
            .map(SequentialHashEngine::hashes_computed)
            .sum()
    }

    /// Build the distributable form of a fully solved set
    ///
    /// Every chain after the first gets its seed masked with its
    /// predecessor's secret; chain 0 keeps its seed in the clear. Commitments
    /// are kept, progress and secrets are dropped. No stepping is done here.
    pub fn make_locked(&self) -> Result<ChainSet> {
        if let Some(index) = self.chains.iter().position(|c| !c.is_solved()) {
            return Err(ChainError::ChainLocked { index });
        }

        let mut locked = Vec::with_capacity(self.chains.len());
        let mut prev_secret: Option<&[u8]> = None;
        for chain in &self.chains {
            locked.push(chain.to_locked(prev_secret)?);
            prev_secret = chain.secret();
        }

        info!(chains = locked.len(), "created locked chain set");

        Ok(ChainSet {
            chains: locked,
            config: self.config.clone(),
        })
    }

    /// Supply chain 0's seed when it was withheld at distribution time
    pub fn supply_seed(&mut self, iv: Vec<u8>) -> Result<()> {
        self.chains[0].set_iv(iv)
    }

    /// Work on the set for at most `budget` using the configured policy
    pub fn unlock(&mut self, budget: Duration) -> Result<bool> {
        self.unlock_with_policy(budget, self.config.policy)
    }

    /// Work on the set for at most `budget`
    ///
    /// Each pass visits the chains in `policy` order and steps the first one
    /// that is workable: not yet solved, with its seed known or decryptable
    /// from its predecessor's secret. Passes repeat until the set's secret is
    /// known or the budget is spent. Returns `true` if the secret is known.
    #[instrument(level = "debug", skip(self), fields(chains = self.chains.len()))]
    pub fn unlock_with_policy(&mut self, budget: Duration, policy: UnlockPolicy) -> Result<bool> {
        let start = Instant::now();

        while self.secret().is_none() && start.elapsed() < budget {
            let Some(index) = self.next_workable(policy)? else {
                warn!("no chain can make progress; seed or predecessor secret missing");
                break;
            };

            let remaining = budget.saturating_sub(start.elapsed());
            debug!(index, ?remaining, "stepping chain");

            if self.chains[index].unlock(remaining)? {
                info!(index, "chain unlocked");
            }
        }

        Ok(self.secret().is_some())
    }

    /// First chain in `policy` order that can be stepped, decrypting its seed
    /// on the way if needed
    fn next_workable(&mut self, policy: UnlockPolicy) -> Result<Option<usize>> {
        let order: Vec<usize> = match policy {
            UnlockPolicy::BackwardFirst => (0..self.chains.len()).rev().collect(),
            UnlockPolicy::ForwardFirst => (0..self.chains.len()).collect(),
        };

        for index in order {
            let chain = &self.chains[index];
            if chain.is_solved() {
                continue;
            }

            let resumable = chain.i() > 0 && chain.midstate().is_some();
            if chain.iv().is_none() && !resumable {
                // Chain 0 is never encrypted
                if index == 0 {
                    continue;
                }

                let Some(prev_secret) = self.chains[index - 1].secret().map(<[u8]>::to_vec) else {
                    continue;
                };

                debug!(index, "decrypting seed with previous chain's secret");
                self.chains[index].decrypt_iv(&prev_secret)?;
            }

            return Ok(Some(index));
        }

        Ok(None)
    }

    /// Try an out-of-band secret against every chain
    ///
    /// The bytes are tried as the raw secret, as a public key and, when they
    /// have the right length, as a secret key, chain by chain in order. The
    /// first chain that accepts ends the search.
    pub fn add_secret(&mut self, candidate: &[u8]) -> Result<bool> {
        for chain_index in 0..self.chains.len() {
            for provenance in SecretProvenance::interpretations(candidate) {
                if self.chains[chain_index].add_provenance(&provenance)? {
                    info!(index = chain_index, kind = provenance.kind(), "secret added");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Try a tagged out-of-band secret against every chain
    pub fn add_provenance(&mut self, provenance: &SecretProvenance) -> Result<bool> {
        for (index, chain) in self.chains.iter_mut().enumerate() {
            if chain.add_provenance(provenance)? {
                info!(index, kind = provenance.kind(), "secret added");
                return Ok(true);
            }
        }
        Ok(false)
    }
}
