//! Key derivation for solved chains
//!
//! A solved chain's final midstate is turned into a secret key, the secret is
//! the SHA-256 of that key's public half, and the commitment published ahead
//! of time is the SHA3-256 of the secret:
//!
//! ```text
//! midstate -> SecretKey -> secret = SHA-256(public key) -> Commitment = SHA3-256(secret)
//! ```
//!
//! Every step is one-way, so a commitment can be published without leaking
//! the secret, and the secret without leaking the key.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

use crate::error::{CryptoError, Result};

/// Size of a secret key in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Size of a derived secret in bytes
pub const SECRET_SIZE: usize = 32;

/// Size of a commitment in bytes
pub const COMMITMENT_SIZE: usize = 32;

/// Text prefix of an encoded secret key
pub const SECRET_KEY_PREFIX: &str = "tlsk1";

/// Text prefix of an encoded commitment
pub const COMMITMENT_PREFIX: &str = "tlc1";

const CHECKSUM_SIZE: usize = 4;

/// Double SHA-256 checksum over `payload`
fn checksum(payload: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let digest = Sha256::digest(Sha256::digest(payload));
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&digest[..CHECKSUM_SIZE]);
    out
}

fn with_checksum(payload: &[u8]) -> Vec<u8> {
    let mut data = payload.to_vec();
    data.extend_from_slice(&checksum(payload));
    data
}

fn strip_checksum<const N: usize>(data: &[u8], what: &'static str) -> Result<[u8; N]> {
    if data.len() != N + CHECKSUM_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: N + CHECKSUM_SIZE,
            actual: data.len(),
        });
    }

    let (payload, sum) = data.split_at(N);
    if checksum(payload).as_slice() != sum {
        return Err(CryptoError::ChecksumMismatch(what));
    }

    let mut out = [0u8; N];
    out.copy_from_slice(payload);
    Ok(out)
}

fn strip_prefix<'a>(text: &'a str, prefix: &str, what: &'static str) -> Result<&'a str> {
    text.strip_prefix(prefix).ok_or_else(|| {
        CryptoError::InvalidEncoding(format!("{} must start with {:?}", what, prefix))
    })
}

/// Constant-time comparison
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Private key derived from a solved chain's midstate
#[derive(Clone)]
pub struct SecretKey(SigningKey);

impl SecretKey {
    /// Derive the key from a final midstate
    pub fn from_midstate(midstate: &[u8]) -> Result<Self> {
        let bytes: [u8; SECRET_KEY_SIZE] =
            midstate.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: SECRET_KEY_SIZE,
                actual: midstate.len(),
            })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Create from raw key bytes
    pub fn from_bytes(bytes: [u8; SECRET_KEY_SIZE]) -> Self {
        Self(SigningKey::from_bytes(&bytes))
    }

    /// Raw key bytes
    ///
    /// # Security Warning
    /// This exposes the key. Only use for serialization.
    pub fn to_bytes(&self) -> [u8; SECRET_KEY_SIZE] {
        self.0.to_bytes()
    }

    /// Public half of the key
    pub fn public_key(&self) -> PublicKeyBytes {
        PublicKeyBytes(self.0.verifying_key().to_bytes())
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.to_bytes(), &other.to_bytes())
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey").field(&self.public_key()).finish()
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = BASE64.encode(with_checksum(&self.to_bytes()));
        write!(f, "{}{}", SECRET_KEY_PREFIX, encoded)
    }
}

impl FromStr for SecretKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        let body = strip_prefix(s, SECRET_KEY_PREFIX, "secret key")?;
        let data = BASE64.decode(body)?;
        let bytes = strip_checksum::<SECRET_KEY_SIZE>(&data, "secret key")?;
        Ok(Self::from_bytes(bytes))
    }
}

impl Serialize for SecretKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SecretKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Public key bytes of a [`SecretKey`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeyBytes(#[serde(with = "hex::serde")] pub [u8; 32]);

impl PublicKeyBytes {
    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for PublicKeyBytes {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Secret revealed by a public key
pub fn pubkey_to_secret(pubkey: &[u8]) -> Vec<u8> {
    Sha256::digest(pubkey).to_vec()
}

/// Secret revealed by a secret key
pub fn seckey_to_secret(seckey: &SecretKey) -> Vec<u8> {
    pubkey_to_secret(seckey.public_key().as_bytes())
}

/// Public commitment to a secret
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Commitment([u8; COMMITMENT_SIZE]);

impl Commitment {
    /// Commit to `secret`
    pub fn from_secret(secret: &[u8]) -> Self {
        let mut out = [0u8; COMMITMENT_SIZE];
        out.copy_from_slice(&Sha3_256::digest(secret));
        Self(out)
    }

    /// Create from raw commitment bytes
    pub fn from_bytes(bytes: [u8; COMMITMENT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw commitment bytes
    pub fn as_bytes(&self) -> &[u8; COMMITMENT_SIZE] {
        &self.0
    }

    /// Whether `candidate` is the secret this commitment was made to
    pub fn verifies(&self, candidate: &[u8]) -> bool {
        constant_time_eq(&self.0, Self::from_secret(candidate).as_bytes())
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", COMMITMENT_PREFIX, hex::encode(with_checksum(&self.0)))
    }
}

impl FromStr for Commitment {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self> {
        let body = strip_prefix(s, COMMITMENT_PREFIX, "commitment")?;
        let data = hex::decode(body)?;
        Ok(Self(strip_checksum::<COMMITMENT_SIZE>(&data, "commitment")?))
    }
}

impl Serialize for Commitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Commitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
