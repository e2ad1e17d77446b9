//! Timelock record files on disk

use anyhow::Context;
use std::path::{Path, PathBuf};

use timelock_chain::ChainSet;
use timelock_crypto::kernel::AlgorithmRegistry;

/// A chain set persisted as a JSON record
pub struct RecordFile {
    path: PathBuf,
    registry: AlgorithmRegistry,
}

impl RecordFile {
    /// Record file at `path` using the built-in algorithms
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            registry: AlgorithmRegistry::default(),
        }
    }

    /// Path on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read and decode the set
    pub fn load(&self) -> anyhow::Result<ChainSet> {
        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        ChainSet::from_json_str(&json, &self.registry)
            .with_context(|| format!("decoding {}", self.path.display()))
    }

    /// Encode and write the set
    ///
    /// The record goes to a sibling file first and is renamed into place, so
    /// an interrupted save never leaves a truncated record behind.
    pub fn save(&self, set: &ChainSet) -> anyhow::Result<()> {
        let json = set.to_json_string()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        std::fs::write(&staging, json)
            .with_context(|| format!("writing {}", staging.display()))?;
        std::fs::rename(&staging, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
