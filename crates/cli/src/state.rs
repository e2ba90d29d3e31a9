//! On-disk registry state.
//!
//! One invocation holds an exclusive lock on `<state>.lock` from load to
//! commit, so concurrent invocations are serialised. Commits go through a
//! temporary file in the same directory and an atomic rename: a failed call
//! never touches the state file.

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use starnotary_registry::{InMemoryAccountLedger, RegistrySnapshot};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default)]
    pub registry: RegistrySnapshot,
    #[serde(default)]
    pub ledger: InMemoryAccountLedger,
}

#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    _lock: File,
}

impl StateStore {
    /// Open the store, blocking until the state lock is free.
    pub fn open(path: &Path) -> Result<Self> {
        let lock_path = path.with_extension("lock");
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;
        lock.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", lock_path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    /// Read the current state. A missing file is an empty registry.
    pub fn load(&self) -> Result<StateFile> {
        if !self.path.exists() {
            debug!("No state at {}, starting empty", self.path.display());
            return Ok(StateFile::default());
        }
        let bytes = fs::read(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    /// Atomically replace the state file.
    pub fn commit(&self, state: &StateFile) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, state)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        debug!("Committed {} stars to {}", state.registry.stars.len(), self.path.display());
        Ok(())
    }
}
