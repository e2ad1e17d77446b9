//! Where an externally discovered secret came from
//!
//! A chain can be solved without stepping when its secret turns up out of
//! band: as the raw secret, as the public key it is hashed from, or as the
//! secret key behind that public key. Each form is mapped onto the same
//! derivation chain used by forward computation.

use timelock_crypto::keys::{pubkey_to_secret, seckey_to_secret, SecretKey, SECRET_KEY_SIZE};
use zeroize::Zeroize;

/// An out-of-band candidate for a chain's secret
#[derive(Clone, Debug)]
pub enum SecretProvenance {
    /// The secret itself
    Secret(Vec<u8>),
    /// Public key whose hash is the secret
    PublicKey(Vec<u8>),
    /// Secret key whose public key hashes to the secret
    SecretKey(SecretKey),
}

impl SecretProvenance {
    /// Candidate secret this provenance stands for
    pub fn candidate_secret(&self) -> Vec<u8> {
        match self {
            SecretProvenance::Secret(secret) => secret.clone(),
            SecretProvenance::PublicKey(pubkey) => pubkey_to_secret(pubkey),
            SecretProvenance::SecretKey(seckey) => seckey_to_secret(seckey),
        }
    }

    /// Readings of untagged bytes, in the order they are tried
    ///
    /// Bytes of secret-key length are also read as a secret key.
    pub fn interpretations(bytes: &[u8]) -> Vec<SecretProvenance> {
        let mut readings = vec![
            SecretProvenance::Secret(bytes.to_vec()),
            SecretProvenance::PublicKey(bytes.to_vec()),
        ];
        if let Ok(raw) = <[u8; SECRET_KEY_SIZE]>::try_from(bytes) {
            readings.push(SecretProvenance::SecretKey(SecretKey::from_bytes(raw)));
        }
        readings
    }

    /// Short tag for logs
    pub fn kind(&self) -> &'static str {
        match self {
            SecretProvenance::Secret(_) => "secret",
            SecretProvenance::PublicKey(_) => "pubkey",
            SecretProvenance::SecretKey(_) => "seckey",
        }
    }
}

impl Drop for SecretProvenance {
    fn drop(&mut self) {
        if let SecretProvenance::Secret(secret) = self {
            secret.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_converge() {
        let seckey = SecretKey::from_bytes([0x33; 32]);
        let pubkey = seckey.public_key();

        let via_seckey = SecretProvenance::SecretKey(seckey).candidate_secret();
        let via_pubkey = SecretProvenance::PublicKey(pubkey.as_bytes().to_vec()).candidate_secret();
        let via_secret = SecretProvenance::Secret(via_pubkey.clone()).candidate_secret();

        assert_eq!(via_seckey, via_pubkey);
        assert_eq!(via_secret, via_pubkey);
    }

    #[test]
    fn test_interpretation_order() {
        let kinds: Vec<_> = SecretProvenance::interpretations(b"abc")
            .iter()
            .map(SecretProvenance::kind)
            .collect();
        assert_eq!(kinds, ["secret", "pubkey"]);

        let kinds: Vec<_> = SecretProvenance::interpretations(&[7; SECRET_KEY_SIZE])
            .iter()
            .map(SecretProvenance::kind)
            .collect();
        assert_eq!(kinds, ["secret", "pubkey", "seckey"]);
    }
}
