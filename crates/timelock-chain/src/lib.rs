//! # Timelock Chain
//!
//! Time-lock puzzles built from sequential hash chains, and daisy-chained
//! sets of them.
//!
//! ## Features
//!
//! - **Sequential work**: Each chain needs `n` hashes that cannot run in parallel
//! - **Resumable**: Work is time-boxed and picks up exactly where it stopped
//! - **Daisy-chaining**: A chain's seed is masked with the previous chain's secret
//! - **Verifiable**: Every secret has a public commitment checked before use
//! - **Portable**: Full state round-trips through a versioned record
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use timelock_chain::{ChainSet, UnlockPolicy};
//! use timelock_crypto::kernel::HashAlgorithm;
//!
//! # fn main() -> timelock_chain::Result<()> {
//! let mut set = ChainSet::new(4, 1_000_000, HashAlgorithm::sha256())?;
//! while !set.unlock_with_policy(Duration::from_secs(1), UnlockPolicy::ForwardFirst)? {}
//!
//! let locked = set.make_locked()?;
//! let published = locked.to_json_string()?;
//! # let _ = published;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod chain_set;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod provenance;

pub use chain_set::ChainSet;
pub use codec::{ChainRecord, TimelockRecord, FORMAT_VERSION};
pub use config::{StepConfig, UnlockConfig, UnlockPolicy};
pub use engine::SequentialHashEngine;
pub use error::{ChainError, Result};
pub use provenance::SecretProvenance;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::chain_set::ChainSet;
    pub use crate::config::{StepConfig, UnlockConfig, UnlockPolicy};
    pub use crate::engine::SequentialHashEngine;
    pub use crate::error::{ChainError, Result};
    pub use crate::provenance::SecretProvenance;
    pub use timelock_crypto::prelude::*;
}
