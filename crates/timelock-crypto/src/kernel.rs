//! Sequential hash kernels
//!
//! A kernel advances a hash-chain state by `m` strictly sequential steps:
//! each step hashes the output of the previous one, so the work cannot be
//! split across cores. An algorithm groups interchangeable kernels that must
//! all produce identical output for the same `(state, m)`.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::digest::{Digest, FixedOutputReset, Output};
use sha2::Sha256;
use sha3::Sha3_256;

use crate::error::{CryptoError, Result};

/// Seed length shared by the built-in 256-bit algorithms
pub const DEFAULT_SEED_LENGTH: usize = 32;

/// An implementation of "advance the state by `steps` sequential hashes"
pub trait HashKernel: Send + Sync + fmt::Debug {
    /// Kernel name, unique within its algorithm
    fn name(&self) -> &str;

    /// Apply `steps` sequential hashes to `midstate`
    ///
    /// Must be a pure function of its arguments. `steps == 0` returns the
    /// state unchanged.
    fn run(&self, midstate: &[u8], steps: u64) -> Vec<u8>;
}

/// Straightforward kernel: one fresh digest per step
pub struct PortableKernel<D> {
    _digest: PhantomData<fn() -> D>,
}

impl<D> PortableKernel<D> {
    /// Create the kernel
    pub fn new() -> Self {
        Self {
            _digest: PhantomData,
        }
    }
}

impl<D> Default for PortableKernel<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for PortableKernel<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PortableKernel")
    }
}

impl<D: Digest> HashKernel for PortableKernel<D> {
    fn name(&self) -> &str {
        "portable"
    }

    fn run(&self, midstate: &[u8], steps: u64) -> Vec<u8> {
        let mut state = midstate.to_vec();
        for _ in 0..steps {
            state = D::digest(&state).to_vec();
        }
        state
    }
}

/// Kernel that reuses one hasher and one output buffer for every step
pub struct FixedBufferKernel<D> {
    _digest: PhantomData<fn() -> D>,
}

impl<D> FixedBufferKernel<D> {
    /// Create the kernel
    pub fn new() -> Self {
        Self {
            _digest: PhantomData,
        }
    }
}

impl<D> Default for FixedBufferKernel<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for FixedBufferKernel<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FixedBufferKernel")
    }
}

impl<D: Digest + FixedOutputReset> HashKernel for FixedBufferKernel<D> {
    fn name(&self) -> &str {
        "fixed-buffer"
    }

    fn run(&self, midstate: &[u8], steps: u64) -> Vec<u8> {
        if steps == 0 {
            return midstate.to_vec();
        }

        let mut hasher = <D as Digest>::new();
        let mut out = Output::<D>::default();

        // The first step may start from a state of any length
        Digest::update(&mut hasher, midstate);
        Digest::finalize_into_reset(&mut hasher, &mut out);

        for _ in 1..steps {
            Digest::update(&mut hasher, &out);
            Digest::finalize_into_reset(&mut hasher, &mut out);
        }

        out.to_vec()
    }
}

/// A sequential hash algorithm and its kernels
#[derive(Debug)]
pub struct HashAlgorithm {
    short_name: String,
    seed_len: usize,
    kernels: Vec<Arc<dyn HashKernel>>,
}

impl HashAlgorithm {
    /// Create an algorithm with no kernels yet
    pub fn new(short_name: impl Into<String>, seed_len: usize) -> Self {
        Self {
            short_name: short_name.into(),
            seed_len,
            kernels: Vec::new(),
        }
    }

    /// Register a kernel; later registrations are presumed faster
    pub fn with_kernel(mut self, kernel: impl HashKernel + 'static) -> Self {
        self.kernels.push(Arc::new(kernel));
        self
    }

    /// Stable short name used in serialized records
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Required seed length in bytes
    pub fn seed_len(&self) -> usize {
        self.seed_len
    }

    /// Kernels in registration order
    pub fn kernels(&self) -> &[Arc<dyn HashKernel>] {
        &self.kernels
    }

    /// Built-in SHA-256 chain
    pub fn sha256() -> Arc<HashAlgorithm> {
        SHA256.clone()
    }

    /// Built-in SHA3-256 chain
    pub fn sha3_256() -> Arc<HashAlgorithm> {
        SHA3_256.clone()
    }
}

static SHA256: Lazy<Arc<HashAlgorithm>> = Lazy::new(|| {
    Arc::new(
        HashAlgorithm::new("sha256", DEFAULT_SEED_LENGTH)
            .with_kernel(PortableKernel::<Sha256>::new())
            .with_kernel(FixedBufferKernel::<Sha256>::new()),
    )
});

static SHA3_256: Lazy<Arc<HashAlgorithm>> = Lazy::new(|| {
    Arc::new(
        HashAlgorithm::new("sha3-256", DEFAULT_SEED_LENGTH)
            .with_kernel(PortableKernel::<Sha3_256>::new())
            .with_kernel(FixedBufferKernel::<Sha3_256>::new()),
    )
});

/// Strategy for choosing which kernel of an algorithm does the stepping
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelSelector {
    /// Most recently registered kernel, presumed fastest
    #[default]
    Latest,
    /// First registered kernel
    First,
    /// Kernel at a fixed registration index
    Index(usize),
    /// Kernel with the given name
    Named(String),
}

impl KernelSelector {
    /// Pick a kernel from `algorithm`
    pub fn select<'a>(&self, algorithm: &'a HashAlgorithm) -> Result<&'a Arc<dyn HashKernel>> {
        let kernels = algorithm.kernels();
        let found = match self {
            KernelSelector::Latest => kernels.last(),
            KernelSelector::First => kernels.first(),
            KernelSelector::Index(index) => kernels.get(*index),
            KernelSelector::Named(name) => kernels.iter().find(|k| k.name() == name),
        };

        found.ok_or_else(|| CryptoError::KernelUnavailable {
            algorithm: algorithm.short_name().to_string(),
            reason: format!("selector {:?} matched nothing", self),
        })
    }
}

/// Short-name lookup of hash algorithms
#[derive(Clone, Debug)]
pub struct AlgorithmRegistry {
    algorithms: HashMap<String, Arc<HashAlgorithm>>,
}

impl AlgorithmRegistry {
    /// Registry with no algorithms
    pub fn empty() -> Self {
        Self {
            algorithms: HashMap::new(),
        }
    }

    /// Add an algorithm, returning any previous one with the same name
    pub fn register(&mut self, algorithm: Arc<HashAlgorithm>) -> Option<Arc<HashAlgorithm>> {
        self.algorithms
            .insert(algorithm.short_name().to_string(), algorithm)
    }

    /// Look up an algorithm by short name
    pub fn get(&self, short_name: &str) -> Result<Arc<HashAlgorithm>> {
        self.algorithms
            .get(short_name)
            .cloned()
            .ok_or_else(|| CryptoError::UnknownAlgorithm(short_name.to_string()))
    }

    /// Registered short names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.algorithms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for AlgorithmRegistry {
    /// Registry containing the built-in algorithms
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(HashAlgorithm::sha256());
        registry.register(HashAlgorithm::sha3_256());
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn iterate_sha256(seed: &[u8], steps: u64) -> Vec<u8> {
        let mut state = seed.to_vec();
        for _ in 0..steps {
            state = Sha256::digest(&state).to_vec();
        }
        state
    }

    #[test]
    fn test_zero_steps_is_identity() {
        let seed = [0x42u8; 32];
        for kernel in HashAlgorithm::sha256().kernels() {
            assert_eq!(kernel.run(&seed, 0), seed.to_vec());
        }
    }

    #[test]
    fn test_sha256_matches_manual_iteration() {
        let seed = [0x07u8; 32];
        let expected = iterate_sha256(&seed, 100);
        for kernel in HashAlgorithm::sha256().kernels() {
            assert_eq!(kernel.run(&seed, 100), expected, "kernel {}", kernel.name());
        }
    }

    #[test]
    fn test_run_is_composable() {
        let algorithm = HashAlgorithm::sha3_256();
        let kernel = KernelSelector::Latest.select(&algorithm).unwrap();
        let seed = [0x11u8; 32];

        let once = kernel.run(&seed, 50);
        let split = kernel.run(&kernel.run(&seed, 20), 30);
        assert_eq!(once, split);
    }

    #[test]
    fn test_fixed_buffer_accepts_short_state() {
        let algorithm = HashAlgorithm::sha256();
        let portable = KernelSelector::First.select(&algorithm).unwrap();
        let fixed = KernelSelector::Latest.select(&algorithm).unwrap();
        assert_eq!(portable.run(b"abc", 3), fixed.run(b"abc", 3));
    }

    #[test]
    fn test_selectors() {
        let algorithm = HashAlgorithm::sha256();
        assert_eq!(KernelSelector::Latest.select(&algorithm).unwrap().name(), "fixed-buffer");
        assert_eq!(KernelSelector::First.select(&algorithm).unwrap().name(), "portable");
        assert_eq!(KernelSelector::Index(0).select(&algorithm).unwrap().name(), "portable");
        assert_eq!(
            KernelSelector::Named("fixed-buffer".into()).select(&algorithm).unwrap().name(),
            "fixed-buffer"
        );
        assert!(matches!(
            KernelSelector::Index(7).select(&algorithm),
            Err(CryptoError::KernelUnavailable { .. })
        ));
    }

    #[test]
    fn test_empty_algorithm_has_no_kernel() {
        let algorithm = HashAlgorithm::new("empty", 32);
        assert!(KernelSelector::default().select(&algorithm).is_err());
    }

    #[test]
    fn test_registry_lookup() {
        let registry = AlgorithmRegistry::default();
        assert_eq!(registry.names(), vec!["sha256", "sha3-256"]);
        assert_eq!(registry.get("sha256").unwrap().seed_len(), 32);
        assert_eq!(
            registry.get("md5").unwrap_err(),
            CryptoError::UnknownAlgorithm("md5".to_string())
        );
    }

    #[test]
    fn test_registry_replaces_by_name() {
        let mut registry = AlgorithmRegistry::empty();
        assert!(registry.register(HashAlgorithm::sha256()).is_none());
        let custom = Arc::new(HashAlgorithm::new("sha256", 16));
        assert!(registry.register(custom).is_some());
        assert_eq!(registry.get("sha256").unwrap().seed_len(), 16);
    }

    proptest! {
        #[test]
        fn prop_kernels_agree(
            seed in proptest::collection::vec(any::<u8>(), 32),
            steps in 0u64..200,
        ) {
            for algorithm in [HashAlgorithm::sha256(), HashAlgorithm::sha3_256()] {
                let outputs: Vec<Vec<u8>> = algorithm
                    .kernels()
                    .iter()
                    .map(|k| k.run(&seed, steps))
                    .collect();
                prop_assert!(outputs.windows(2).all(|w| w[0] == w[1]));
            }
        }
    }
}
