//! Seed masking
//!
//! A chain's seed is hidden by XOR with the previous chain's secret. XOR is
//! its own inverse, so the same operation masks and unmasks.

use crate::error::{CryptoError, Result};

/// Bytewise XOR of two equal-length buffers
pub fn xor_bytes(a: &[u8], b: &[u8]) -> Result<Vec<u8>> {
    if a.len() != b.len() {
        return Err(CryptoError::LengthMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    Ok(a.iter().zip(b).map(|(x, y)| x ^ y).collect())
}
