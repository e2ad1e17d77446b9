//! Error types for chain and chain-set operations

use thiserror::Error;
use timelock_crypto::CryptoError;

/// Result type alias
pub type Result<T> = std::result::Result<T, ChainError>;

/// Errors raised by engines, chain sets and the record codec
#[derive(Debug, Error)]
pub enum ChainError {
    /// Kernel, key-derivation or masking failure
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Plaintext seed is needed but only the encrypted one is known
    #[error("Decrypted IV not available; chain needs decryption first")]
    IvUnavailable,

    /// Encrypted seed is needed but was never set
    #[error("Encrypted IV not available")]
    EncryptedIvUnavailable,

    /// Stepping cannot start: neither a seed nor a resumable midstate is known
    #[error("Midstate not available; chain needs decryption first")]
    MidstateUnavailable,

    /// Candidate secrets cannot be checked before the commitment exists
    #[error("Chain has no commitment yet; it needs forward computation first")]
    NotCommitted,

    /// Stepping target lies beyond the chain length
    #[error("Target index {target} exceeds chain length {n}")]
    TargetOutOfRange {
        /// Requested index
        target: u64,
        /// Chain length
        n: u64,
    },

    /// Forward computation reached a secret that does not match the commitment
    #[error("Derived secret does not match the chain's commitment")]
    CommitmentMismatch,

    /// Operation needs a solved chain
    #[error("Chain {index} is still locked")]
    ChainLocked {
        /// Position of the chain in its set
        index: usize,
    },

    /// A chain set needs at least one chain
    #[error("A chain set needs at least one chain")]
    NoChains,

    /// Record was written by an incompatible format version
    #[error("Record version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Version this build reads and writes
        expected: u32,
        /// Version found in the record
        actual: u32,
    },

    /// Record is well-formed but describes an impossible state
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for ChainError {
    fn from(err: bincode::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}
