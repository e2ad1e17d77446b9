//! Portable record format for chain sets
//!
//! The record captures everything needed to resume work exactly where it
//! stopped, mid-chain included. Missing values are written as explicit
//! nulls so the shape of a record never depends on how far solving got.

use serde::{Deserialize, Serialize};

use timelock_crypto::kernel::AlgorithmRegistry;
use timelock_crypto::keys::{Commitment, SecretKey};

use crate::chain_set::ChainSet;
use crate::engine::SequentialHashEngine;
use crate::error::{ChainError, Result};

/// Current record format version
pub const FORMAT_VERSION: u32 = 1;

/// Serialized chain set
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockRecord {
    /// Format version
    pub version: u32,
    /// Chains in order
    pub chains: Vec<ChainRecord>,
}

/// Serialized chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRecord {
    /// Algorithm short name
    pub algorithm: String,
    /// Plaintext seed
    #[serde(with = "opt_hex")]
    pub iv: Option<Vec<u8>>,
    /// Seed masked with the previous chain's secret
    #[serde(with = "opt_hex")]
    pub encrypted_iv: Option<Vec<u8>>,
    /// Total steps
    pub n: u64,
    /// Steps completed
    pub i: u64,
    /// State after `i` steps
    #[serde(with = "opt_hex")]
    pub midstate: Option<Vec<u8>>,
    /// Commitment to the secret
    pub hashed_secret: Option<Commitment>,
    /// Secret key derived from the final midstate
    pub seckey: Option<SecretKey>,
    /// Solved secret
    #[serde(with = "opt_hex")]
    pub secret: Option<Vec<u8>>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

fn check_version(version: u32) -> Result<()> {
    if version != FORMAT_VERSION {
        return Err(ChainError::VersionMismatch {
            expected: FORMAT_VERSION,
            actual: version,
        });
    }
    Ok(())
}

impl ChainRecord {
    fn from_engine(engine: &SequentialHashEngine) -> Self {
        Self {
            algorithm: engine.algorithm.short_name().to_string(),
            iv: engine.iv.clone(),
            encrypted_iv: engine.encrypted_iv.clone(),
            n: engine.n,
            i: engine.i,
            midstate: engine.midstate.clone(),
            hashed_secret: engine.hashed_secret,
            seckey: engine.seckey.clone(),
            secret: engine.secret.clone(),
        }
    }

    fn to_engine(
        &self,
        index: usize,
        registry: &AlgorithmRegistry,
    ) -> Result<SequentialHashEngine> {
        let algorithm = registry.get(&self.algorithm)?;

        if self.i > self.n {
            return Err(ChainError::InvalidRecord(format!(
                "chain {}: progress {} exceeds length {}",
                index, self.i, self.n
            )));
        }

        for (field, value) in [("iv", &self.iv), ("encrypted_iv", &self.encrypted_iv)] {
            if let Some(bytes) = value {
                if bytes.len() != algorithm.seed_len() {
                    return Err(ChainError::InvalidRecord(format!(
                        "chain {}: {} is {} bytes, {} expects {}",
                        index,
                        field,
                        bytes.len(),
                        algorithm.short_name(),
                        algorithm.seed_len()
                    )));
                }
            }
        }

        let mut engine = SequentialHashEngine::empty(self.n, algorithm);
        engine.iv = self.iv.clone();
        engine.encrypted_iv = self.encrypted_iv.clone();
        engine.i = self.i;
        engine.midstate = self.midstate.clone();
        engine.hashed_secret = self.hashed_secret;
        engine.seckey = self.seckey.clone();
        engine.secret = self.secret.clone();
        Ok(engine)
    }
}

impl ChainSet {
    /// Encode the full state of the set
    pub fn to_record(&self) -> TimelockRecord {
        TimelockRecord {
            version: FORMAT_VERSION,
            chains: self.chains().iter().map(ChainRecord::from_engine).collect(),
        }
    }

    /// Rebuild a set from a record
    ///
    /// Fails without partial results on a version mismatch, an unknown
    /// algorithm or an inconsistent chain.
    pub fn from_record(record: &TimelockRecord, registry: &AlgorithmRegistry) -> Result<Self> {
        check_version(record.version)?;

        let chains = record
            .chains
            .iter()
            .enumerate()
            .map(|(index, chain)| chain.to_engine(index, registry))
            .collect::<Result<Vec<_>>>()?;

        ChainSet::from_chains(chains)
    }

    /// Encode as pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_record())?)
    }

    /// Decode from JSON
    pub fn from_json_str(json: &str, registry: &AlgorithmRegistry) -> Result<Self> {
        let header: VersionHeader = serde_json::from_str(json)?;
        check_version(header.version)?;

        let record: TimelockRecord = serde_json::from_str(json)?;
        Self::from_record(&record, registry)
    }

    /// Encode as compact binary
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&self.to_record())?)
    }

    /// Decode from compact binary
    pub fn from_bytes(bytes: &[u8], registry: &AlgorithmRegistry) -> Result<Self> {
        let header: VersionHeader = bincode::deserialize(bytes)?;
        check_version(header.version)?;

        let record: TimelockRecord = bincode::deserialize(bytes)?;
        Self::from_record(&record, registry)
    }
}

/// Optional byte strings as lowercase hex or null
mod opt_hex {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| hex::decode(text).map_err(D::Error::custom))
            .transpose()
    }
}
