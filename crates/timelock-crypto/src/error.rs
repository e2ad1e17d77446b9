//! Error types for kernel and key-derivation operations

use thiserror::Error;

/// Result type alias for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur in the hash kernels and key-derivation chain
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Two byte buffers that must be the same length were not
    #[error("Length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Length of the reference buffer
        expected: usize,
        /// Length of the buffer that disagreed
        actual: usize,
    },

    /// Invalid key length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Required key size in bytes
        expected: usize,
        /// Size of the input
        actual: usize,
    },

    /// Text encoding could not be parsed
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Checksum embedded in a text encoding did not match its payload
    #[error("Checksum mismatch in encoded {0}")]
    ChecksumMismatch(&'static str),

    /// No algorithm registered under this short name
    #[error("Unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Algorithm has no kernel matching the selector
    #[error("No kernel available for {algorithm}: {reason}")]
    KernelUnavailable {
        /// Short name of the algorithm
        algorithm: String,
        /// Why selection failed
        reason: String,
    },
}

impl From<hex::FromHexError> for CryptoError {
    fn from(err: hex::FromHexError) -> Self {
        CryptoError::InvalidEncoding(err.to_string())
    }
}

impl From<base64::DecodeError> for CryptoError {
    fn from(err: base64::DecodeError) -> Self {
        CryptoError::InvalidEncoding(err.to_string())
    }
}
