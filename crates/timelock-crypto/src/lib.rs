//! # Timelock Cryptographic Library
//!
//! Primitives underneath timelock puzzles: the sequential hash kernels that
//! make a puzzle slow to solve, and the one-way derivations that turn a
//! solved puzzle into a secret and a public commitment.
//!
//! ## Core Components
//!
//! - [`kernel`]: Sequential hash kernels, algorithms and their registry
//! - [`keys`]: Secret key, secret and commitment derivation with text encodings
//! - [`mask`]: XOR masking of chain seeds

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod kernel;
pub mod keys;
pub mod mask;

pub use error::{CryptoError, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{CryptoError, Result};
    pub use crate::kernel::{AlgorithmRegistry, HashAlgorithm, HashKernel, KernelSelector};
    pub use crate::keys::{
        pubkey_to_secret, seckey_to_secret, Commitment, PublicKeyBytes, SecretKey,
    };
    pub use crate::mask::xor_bytes;
}
