//! Sequential hash engine: one timelock puzzle
//!
//! An engine walks a seed through `n` sequential hashes. Progress is kept as
//! `(i, midstate)` so work can stop whenever the caller's time budget runs
//! out and resume later, including after a round trip through the record
//! codec. Once `i == n` the final midstate yields a secret key, a secret and
//! a public commitment to that secret.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info, trace};
use zeroize::Zeroize;

use timelock_crypto::kernel::HashAlgorithm;
use timelock_crypto::keys::{seckey_to_secret, Commitment, SecretKey};
use timelock_crypto::mask::xor_bytes;
use timelock_crypto::CryptoError;

use crate::config::StepConfig;
use crate::error::{ChainError, Result};
use crate::provenance::SecretProvenance;

/// One puzzle in a chain set
#[derive(Clone)]
pub struct SequentialHashEngine {
    pub(crate) n: u64,
    pub(crate) algorithm: Arc<HashAlgorithm>,
    pub(crate) iv: Option<Vec<u8>>,
    pub(crate) encrypted_iv: Option<Vec<u8>>,
    pub(crate) i: u64,
    pub(crate) midstate: Option<Vec<u8>>,
    pub(crate) seckey: Option<SecretKey>,
    pub(crate) secret: Option<Vec<u8>>,
    pub(crate) hashed_secret: Option<Commitment>,
    step: StepConfig,
    hashes_computed: u64,
}

impl SequentialHashEngine {
    /// Create a chain of `n` steps from a plaintext seed
    pub fn new(n: u64, algorithm: Arc<HashAlgorithm>, iv: Vec<u8>) -> Result<Self> {
        check_seed_len(&algorithm, &iv)?;
        let mut engine = Self::empty(n, algorithm);
        engine.midstate = Some(iv.clone());
        engine.iv = Some(iv);
        Ok(engine)
    }

    /// Create a chain of `n` steps from a fresh random seed
    pub fn random(n: u64, algorithm: Arc<HashAlgorithm>) -> Self {
        let mut iv = vec![0u8; algorithm.seed_len()];
        OsRng.fill_bytes(&mut iv);
        let mut engine = Self::empty(n, algorithm);
        engine.midstate = Some(iv.clone());
        engine.iv = Some(iv);
        engine
    }

    /// Create a chain whose seed is only known encrypted, with its commitment
    pub fn locked(
        n: u64,
        algorithm: Arc<HashAlgorithm>,
        encrypted_iv: Vec<u8>,
        hashed_secret: Commitment,
    ) -> Result<Self> {
        check_seed_len(&algorithm, &encrypted_iv)?;
        let mut engine = Self::empty(n, algorithm);
        engine.encrypted_iv = Some(encrypted_iv);
        engine.hashed_secret = Some(hashed_secret);
        Ok(engine)
    }

    pub(crate) fn empty(n: u64, algorithm: Arc<HashAlgorithm>) -> Self {
        Self {
            n,
            algorithm,
            iv: None,
            encrypted_iv: None,
            i: 0,
            midstate: None,
            seckey: None,
            secret: None,
            hashed_secret: None,
            step: StepConfig::default(),
            hashes_computed: 0,
        }
    }

    /// Total sequential steps
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Steps completed so far
    pub fn i(&self) -> u64 {
        self.i
    }

    /// Hash algorithm of this chain
    pub fn algorithm(&self) -> &Arc<HashAlgorithm> {
        &self.algorithm
    }

    /// Plaintext seed, if known
    pub fn iv(&self) -> Option<&[u8]> {
        self.iv.as_deref()
    }

    /// Seed masked with the previous chain's secret, if set
    pub fn encrypted_iv(&self) -> Option<&[u8]> {
        self.encrypted_iv.as_deref()
    }

    /// Chain state after `i` steps, if known
    pub fn midstate(&self) -> Option<&[u8]> {
        self.midstate.as_deref()
    }

    /// Secret key derived from the final midstate
    pub fn seckey(&self) -> Option<&SecretKey> {
        self.seckey.as_ref()
    }

    /// Solved secret
    pub fn secret(&self) -> Option<&[u8]> {
        self.secret.as_deref()
    }

    /// Public commitment to the secret
    pub fn hashed_secret(&self) -> Option<&Commitment> {
        self.hashed_secret.as_ref()
    }

    /// Whether the secret is known
    pub fn is_solved(&self) -> bool {
        self.secret.is_some()
    }

    /// Hash steps this instance has computed since it was created or loaded
    pub fn hashes_computed(&self) -> u64 {
        self.hashes_computed
    }

    /// Stepping configuration
    pub fn step_config(&self) -> &StepConfig {
        &self.step
    }

    /// Replace the stepping configuration
    pub fn set_step_config(&mut self, step: StepConfig) {
        self.step = step;
    }

    /// Mask the seed with the previous chain's secret
    pub fn encrypt_iv(&mut self, prev_secret: &[u8]) -> Result<()> {
        let iv = self.iv.as_deref().ok_or(ChainError::IvUnavailable)?;
        self.encrypted_iv = Some(xor_bytes(iv, prev_secret)?);
        Ok(())
    }

    /// Recover the seed using the previous chain's secret
    ///
    /// Any earlier progress or derived secret is discarded: stepping
    /// restarts from the seed.
    pub fn decrypt_iv(&mut self, prev_secret: &[u8]) -> Result<()> {
        let encrypted_iv = self
            .encrypted_iv
            .as_deref()
            .ok_or(ChainError::EncryptedIvUnavailable)?;
        let iv = xor_bytes(encrypted_iv, prev_secret)?;

        self.restart_from(iv);
        Ok(())
    }

    /// Step toward the end of the chain for at most `budget`
    ///
    /// Returns `true` if the secret is known afterwards.
    pub fn unlock(&mut self, budget: Duration) -> Result<bool> {
        self.unlock_to(budget, self.n)
    }

    /// Step toward index `target` for at most `budget`
    ///
    /// Batches start at one step and double after every kernel call that
    /// finished under the batch threshold, so the budget can be overrun by
    /// roughly one batch.
    pub fn unlock_to(&mut self, budget: Duration, target: u64) -> Result<bool> {
        if target > self.n {
            return Err(ChainError::TargetOutOfRange { target, n: self.n });
        }

        if self.i == 0 {
            if let Some(iv) = &self.iv {
                self.midstate = Some(iv.clone());
            }
        }

        let mut midstate = self
            .midstate
            .clone()
            .ok_or(ChainError::MidstateUnavailable)?;
        let kernel = self.step.kernel.select(&self.algorithm)?.clone();
        let threshold = self.step.batch_threshold();

        let start = Instant::now();
        let mut max_batch: u64 = 1;

        while self.i < target && start.elapsed() < budget {
            let batch = (target - self.i).min(max_batch);

            let t0 = Instant::now();
            midstate = kernel.run(&midstate, batch);
            let took = t0.elapsed();

            self.i += batch;
            self.hashes_computed += batch;
            trace!(batch, i = self.i, ?took, "kernel batch done");

            if took < threshold {
                max_batch = max_batch.saturating_mul(2);
            }
        }

        debug_assert!(self.i <= self.n);
        self.midstate = Some(midstate);

        debug!(
            algorithm = self.algorithm.short_name(),
            kernel = kernel.name(),
            i = self.i,
            n = self.n,
            elapsed = ?start.elapsed(),
            "unlock pass finished"
        );

        if self.i == self.n {
            self.derive_secret()?;
        }

        Ok(self.secret.is_some())
    }

    /// Derive seckey, secret and commitment from the final midstate
    fn derive_secret(&mut self) -> Result<()> {
        let midstate = self
            .midstate
            .as_deref()
            .ok_or(ChainError::MidstateUnavailable)?;
        let seckey = SecretKey::from_midstate(midstate)?;
        let secret = seckey_to_secret(&seckey);
        let commitment = Commitment::from_secret(&secret);

        if let Some(existing) = &self.hashed_secret {
            if *existing != commitment {
                return Err(ChainError::CommitmentMismatch);
            }
        }

        if self.secret.is_none() {
            info!(n = self.n, commitment = %commitment, "chain solved");
        }

        self.seckey = Some(seckey);
        self.secret = Some(secret);
        self.hashed_secret = Some(commitment);
        Ok(())
    }

    /// Accept `candidate` as the secret if it matches the commitment
    ///
    /// A mismatch returns `Ok(false)` and leaves the chain untouched.
    pub fn add_secret(&mut self, candidate: &[u8]) -> Result<bool> {
        let commitment = self.hashed_secret.ok_or(ChainError::NotCommitted)?;

        if commitment.verifies(candidate) {
            self.secret = Some(candidate.to_vec());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Accept a public key whose hash is the secret
    pub fn add_pubkey_secret(&mut self, pubkey: &[u8]) -> Result<bool> {
        self.add_provenance(&SecretProvenance::PublicKey(pubkey.to_vec()))
    }

    /// Accept a secret key whose public key hashes to the secret
    pub fn add_seckey(&mut self, seckey: &SecretKey) -> Result<bool> {
        self.add_provenance(&SecretProvenance::SecretKey(seckey.clone()))
    }

    /// Accept an out-of-band secret of any provenance
    pub fn add_provenance(&mut self, provenance: &SecretProvenance) -> Result<bool> {
        let accepted = self.add_secret(&provenance.candidate_secret())?;

        if accepted {
            if let SecretProvenance::SecretKey(seckey) = provenance {
                self.seckey = Some(seckey.clone());
            }
            debug!(kind = provenance.kind(), "accepted out-of-band secret");
        }

        Ok(accepted)
    }

    /// Distributable copy: seed masked with `prev_secret` (or kept in the
    /// clear when `None`), commitment retained, everything else dropped
    pub(crate) fn to_locked(&self, prev_secret: Option<&[u8]>) -> Result<Self> {
        let hashed_secret = self.hashed_secret.ok_or(ChainError::NotCommitted)?;

        let mut locked = Self::empty(self.n, self.algorithm.clone());
        locked.iv = self.iv.clone();
        locked.hashed_secret = Some(hashed_secret);
        locked.step = self.step.clone();

        match prev_secret {
            Some(prev_secret) => {
                locked.encrypt_iv(prev_secret)?;
                locked.iv = None;
            }
            None => locked.midstate = locked.iv.clone(),
        }

        Ok(locked)
    }

    /// Supply a plaintext seed, restarting progress from it
    pub(crate) fn set_iv(&mut self, iv: Vec<u8>) -> Result<()> {
        check_seed_len(&self.algorithm, &iv)?;
        self.restart_from(iv);
        Ok(())
    }

    /// Reset progress to step 0 of `iv`
    ///
    /// Secret and key are dropped until re-derived at `i == n`; the
    /// commitment stays, so a seed that leads elsewhere is caught then.
    fn restart_from(&mut self, iv: Vec<u8>) {
        self.midstate = Some(iv.clone());
        self.iv = Some(iv);
        self.i = 0;
        self.secret.zeroize();
        self.secret = None;
        self.seckey = None;
    }
}

fn check_seed_len(algorithm: &HashAlgorithm, seed: &[u8]) -> Result<()> {
    if seed.len() != algorithm.seed_len() {
        return Err(CryptoError::LengthMismatch {
            expected: algorithm.seed_len(),
            actual: seed.len(),
        }
        .into());
    }
    Ok(())
}

impl fmt::Debug for SequentialHashEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialHashEngine")
            .field("algorithm", &self.algorithm.short_name())
            .field("n", &self.n)
            .field("i", &self.i)
            .field("has_iv", &self.iv.is_some())
            .field("has_encrypted_iv", &self.encrypted_iv.is_some())
            .field("solved", &self.secret.is_some())
            .field("hashed_secret", &self.hashed_secret)
            .finish()
    }
}

impl Drop for SequentialHashEngine {
    fn drop(&mut self) {
        self.secret.zeroize();
        self.midstate.zeroize();
        self.iv.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use timelock_crypto::kernel::{HashKernel, KernelSelector, PortableKernel};

    const BUDGET: Duration = Duration::from_secs(3600);

    fn engine(n: u64, seed: u8) -> SequentialHashEngine {
        SequentialHashEngine::new(n, HashAlgorithm::sha256(), vec![seed; 32]).unwrap()
    }

    fn solved(n: u64, seed: u8) -> SequentialHashEngine {
        let mut engine = engine(n, seed);
        assert!(engine.unlock(BUDGET).unwrap());
        engine
    }

    /// SHA-256 kernel that logs every batch size it is asked for
    #[derive(Debug)]
    struct RecordingKernel {
        batches: Arc<Mutex<Vec<u64>>>,
        delay: Duration,
    }

    impl HashKernel for RecordingKernel {
        fn name(&self) -> &str {
            "recording"
        }

        fn run(&self, midstate: &[u8], steps: u64) -> Vec<u8> {
            self.batches.lock().unwrap().push(steps);
            std::thread::sleep(self.delay);
            PortableKernel::<sha2::Sha256>::new().run(midstate, steps)
        }
    }

    fn recording_engine(n: u64, delay: Duration) -> (SequentialHashEngine, Arc<Mutex<Vec<u64>>>) {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let algorithm = HashAlgorithm::new("recording", 32).with_kernel(RecordingKernel {
            batches: batches.clone(),
            delay,
        });
        let engine = SequentialHashEngine::new(n, Arc::new(algorithm), vec![0x0B; 32]).unwrap();
        (engine, batches)
    }

    #[test]
    fn test_new_checks_seed_length() {
        let err = SequentialHashEngine::new(10, HashAlgorithm::sha256(), vec![0; 16]).unwrap_err();
        assert!(matches!(
            err,
            ChainError::Crypto(CryptoError::LengthMismatch {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn test_random_seed() {
        let a = SequentialHashEngine::random(10, HashAlgorithm::sha256());
        let b = SequentialHashEngine::random(10, HashAlgorithm::sha256());
        assert_eq!(a.iv().unwrap().len(), 32);
        assert_ne!(a.iv(), b.iv());
        assert_eq!(a.midstate(), a.iv());
    }

    #[test]
    fn test_unlock_derives_secret() {
        let engine = solved(100, 0x01);

        assert_eq!(engine.i(), 100);
        let seckey = engine.seckey().unwrap();
        let secret = engine.secret().unwrap();
        assert_eq!(secret, seckey_to_secret(seckey).as_slice());
        assert!(engine.hashed_secret().unwrap().verifies(secret));
        assert_eq!(engine.hashes_computed(), 100);
    }

    #[test]
    fn test_batches_double_up_to_target() {
        let (mut engine, batches) = recording_engine(100, Duration::ZERO);

        assert!(engine.unlock(BUDGET).unwrap());
        assert_eq!(*batches.lock().unwrap(), vec![1, 2, 4, 8, 16, 32, 37]);
        assert_eq!(engine.secret(), solved(100, 0x0B).secret());
    }

    #[test]
    fn test_batches_capped_by_intermediate_target() {
        let (mut engine, batches) = recording_engine(100, Duration::ZERO);

        engine.unlock_to(BUDGET, 10).unwrap();
        assert_eq!(*batches.lock().unwrap(), vec![1, 2, 4, 3]);
        assert_eq!(engine.i(), 10);
    }

    #[test]
    fn test_slow_batches_do_not_grow() {
        let (mut engine, batches) = recording_engine(5, Duration::from_millis(3));
        engine.set_step_config(StepConfig {
            batch_threshold_ms: 1,
            ..Default::default()
        });

        assert!(engine.unlock(BUDGET).unwrap());
        assert_eq!(*batches.lock().unwrap(), vec![1; 5]);
    }

    #[test]
    fn test_budget_expiry_stops_between_batches() {
        let (mut engine, batches) = recording_engine(1000, Duration::from_millis(5));
        engine.set_step_config(StepConfig {
            batch_threshold_ms: 1,
            ..Default::default()
        });

        assert!(!engine.unlock(Duration::from_millis(20)).unwrap());
        let batches = batches.lock().unwrap();
        assert!(!batches.is_empty());
        assert!(batches.iter().all(|&b| b == 1));
        assert_eq!(engine.i(), batches.len() as u64);
        assert!(engine.i() < 1000);
    }

    #[test]
    fn test_zero_length_chain() {
        let engine = solved(0, 0x02);
        let expected = SecretKey::from_midstate(&[0x02; 32]).unwrap();
        assert_eq!(engine.seckey(), Some(&expected));
    }

    #[test]
    fn test_zero_budget_does_no_work() {
        let mut engine = engine(10, 0);
        assert!(!engine.unlock(Duration::ZERO).unwrap());
        assert_eq!(engine.i(), 0);
    }

    #[test]
    fn test_unlock_to_stops_at_target() {
        let mut engine = engine(50, 0);
        assert!(!engine.unlock_to(BUDGET, 20).unwrap());
        assert_eq!(engine.i(), 20);
        assert!(engine.secret().is_none());
    }

    #[test]
    fn test_split_unlock_matches_single() {
        let single = solved(257, 0x03);

        let mut split = engine(257, 0x03);
        for target in [1, 2, 100, 200, 256] {
            split.unlock_to(BUDGET, target).unwrap();
        }
        assert!(split.unlock(BUDGET).unwrap());

        assert_eq!(split.midstate(), single.midstate());
        assert_eq!(split.secret(), single.secret());
        assert_eq!(split.hashed_secret(), single.hashed_secret());
    }

    #[test]
    fn test_target_out_of_range() {
        let mut engine = engine(5, 0);
        assert!(matches!(
            engine.unlock_to(BUDGET, 6),
            Err(ChainError::TargetOutOfRange { target: 6, n: 5 })
        ));
    }

    #[test]
    fn test_locked_chain_needs_decryption() {
        let source = solved(10, 0x04);
        let mut locked = source.to_locked(Some(&[0xAA; 32])).unwrap();

        assert!(locked.iv().is_none());
        assert!(matches!(
            locked.unlock(BUDGET),
            Err(ChainError::MidstateUnavailable)
        ));
        assert!(matches!(
            locked.encrypt_iv(&[0; 32]),
            Err(ChainError::IvUnavailable)
        ));
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let mut engine = solved(10, 0x05);
        let prev = [0x5Au8; 32];

        engine.encrypt_iv(&prev).unwrap();
        let encrypted = engine.encrypted_iv().unwrap().to_vec();
        assert_ne!(encrypted, vec![0x05; 32]);

        engine.decrypt_iv(&prev).unwrap();
        assert_eq!(engine.iv(), Some(&[0x05u8; 32][..]));
        assert_eq!(engine.i(), 0);
        assert_eq!(engine.midstate(), engine.iv());
        assert!(!engine.is_solved());
    }

    #[test]
    fn test_decrypt_without_encrypted_iv() {
        let mut engine = engine(1, 0);
        assert!(matches!(
            engine.decrypt_iv(&[0; 32]),
            Err(ChainError::EncryptedIvUnavailable)
        ));
    }

    #[test]
    fn test_xor_length_checked() {
        let mut engine = solved(1, 0x06);
        assert!(matches!(
            engine.encrypt_iv(&[0; 31]),
            Err(ChainError::Crypto(CryptoError::LengthMismatch { .. }))
        ));
    }

    #[test]
    fn test_decrypt_length_checked() {
        let source = solved(10, 0x0C);
        let mut locked = source.to_locked(Some(&[0x01; 32])).unwrap();

        assert!(matches!(
            locked.decrypt_iv(&[0x01; 16]),
            Err(ChainError::Crypto(CryptoError::LengthMismatch {
                expected: 32,
                actual: 16
            }))
        ));
        assert!(locked.iv().is_none());
        assert!(locked.midstate().is_none());
    }

    #[test]
    fn test_new_seed_clears_derived_secret() {
        let mut engine = solved(3, 0x0D);
        let commitment = *engine.hashed_secret().unwrap();

        engine.set_iv(vec![0x0E; 32]).unwrap();
        assert_eq!(engine.i(), 0);
        assert!(!engine.is_solved());
        assert!(engine.seckey().is_none());
        assert_eq!(engine.hashed_secret(), Some(&commitment));

        // A different seed cannot reproduce the committed secret
        assert!(matches!(
            engine.unlock(BUDGET),
            Err(ChainError::CommitmentMismatch)
        ));
        assert!(!engine.is_solved());

        engine.set_iv(vec![0x0D; 32]).unwrap();
        assert!(engine.unlock(BUDGET).unwrap());
        assert_eq!(engine.hashed_secret(), Some(&commitment));
    }

    #[test]
    fn test_add_secret_requires_commitment() {
        let mut engine = engine(1, 0);
        assert!(matches!(
            engine.add_secret(&[0; 32]),
            Err(ChainError::NotCommitted)
        ));
    }

    #[test]
    fn test_add_secret_paths() {
        let source = solved(10, 0x07);
        let secret = source.secret().unwrap().to_vec();
        let seckey = source.seckey().unwrap().clone();

        let mut locked = source.to_locked(Some(&[0x01; 32])).unwrap();
        assert!(!locked.add_secret(&[0; 32]).unwrap());
        assert!(locked.secret().is_none());
        assert!(locked.add_secret(&secret).unwrap());
        assert_eq!(locked.secret(), Some(secret.as_slice()));

        let mut locked = source.to_locked(Some(&[0x01; 32])).unwrap();
        assert!(locked
            .add_pubkey_secret(seckey.public_key().as_bytes())
            .unwrap());
        assert_eq!(locked.secret(), Some(secret.as_slice()));

        let mut locked = source.to_locked(Some(&[0x01; 32])).unwrap();
        assert!(locked.add_seckey(&seckey).unwrap());
        assert_eq!(locked.seckey(), Some(&seckey));
    }

    #[test]
    fn test_commitment_mismatch_rejected() {
        let source = solved(10, 0x08);
        let mut locked = source.to_locked(Some(&[0x01; 32])).unwrap();

        // Wrong predecessor secret: the recovered seed leads somewhere else
        locked.decrypt_iv(&[0x02; 32]).unwrap();
        assert!(matches!(
            locked.unlock(BUDGET),
            Err(ChainError::CommitmentMismatch)
        ));
        assert!(locked.secret().is_none());
        assert_eq!(locked.hashed_secret(), source.hashed_secret());
    }

    #[test]
    fn test_resume_from_midstate_without_iv() {
        let mut engine = engine(40, 0x09);
        engine.unlock_to(BUDGET, 15).unwrap();
        engine.iv = None;

        assert!(engine.unlock(BUDGET).unwrap());
        assert_eq!(engine.secret(), solved(40, 0x09).secret());
    }

    #[test]
    fn test_kernel_selection_is_transparent() {
        let algorithm = HashAlgorithm::sha3_256();
        let mut portable =
            SequentialHashEngine::new(64, algorithm.clone(), vec![0x0A; 32]).unwrap();
        portable.set_step_config(StepConfig {
            kernel: KernelSelector::First,
            ..Default::default()
        });
        let mut fixed = SequentialHashEngine::new(64, algorithm, vec![0x0A; 32]).unwrap();

        portable.unlock(BUDGET).unwrap();
        fixed.unlock(BUDGET).unwrap();
        assert_eq!(portable.secret(), fixed.secret());
    }
}
