//! Per-repository media strategy, persisted as JSON.
//!
//! ```json
//! { "version": 1, "repositories": { "/abs/workspace": "stream-only" } }
//! ```
//!
//! Writes take an advisory lock on `<file>.lock` and merge with the current
//! file content, so two processes choosing strategies for different
//! repositories never lose each other's entries.

use crate::error::{LfsError, LfsResult};
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

const STORE_VERSION: u32 = 1;

/// When large-file bytes are brought to local disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepoStrategy {
    /// Download every pointer's bytes after checkout.
    #[default]
    AutoDownload,
    /// Place the pointer text as a placeholder; bytes are fetched on access.
    StreamAndSave,
    /// Do nothing locally.
    StreamOnly,
}

impl RepoStrategy {
    /// Returns the persisted name.
    pub fn as_str(self) -> &'static str {
        match self {
            RepoStrategy::AutoDownload => "auto-download",
            RepoStrategy::StreamAndSave => "stream-and-save",
            RepoStrategy::StreamOnly => "stream-only",
        }
    }
}

impl fmt::Display for RepoStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoStrategy {
    type Err = LfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto-download" => Ok(RepoStrategy::AutoDownload),
            "stream-and-save" => Ok(RepoStrategy::StreamAndSave),
            "stream-only" => Ok(RepoStrategy::StreamOnly),
            other => Err(LfsError::StrategyStore(format!("unknown strategy {other:?}"))),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    repositories: BTreeMap<String, RepoStrategy>,
}

/// Strategy per workspace, keyed by absolute path.
///
/// Entries are created on first explicit choice and never removed
/// automatically.
#[derive(Debug)]
pub struct StrategyStore {
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, RepoStrategy>>,
}

impl StrategyStore {
    /// A store that lives only as long as this value.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Opens the store at `path`, creating nothing until the first write.
    pub fn open(path: impl Into<PathBuf>) -> LfsResult<Self> {
        let path = path.into();
        let entries = read_store(&path)?.repositories;
        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    /// Returns the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the strategy for `workspace`, or the default if none was chosen.
    pub fn get(&self, workspace: &Path) -> RepoStrategy {
        self.explicit(workspace).unwrap_or_default()
    }

    /// Returns the strategy explicitly chosen for `workspace`.
    pub fn explicit(&self, workspace: &Path) -> Option<RepoStrategy> {
        self.entries.read().get(&key(workspace)).copied()
    }

    /// Records the strategy for `workspace` and persists it.
    pub fn set(&self, workspace: &Path, strategy: RepoStrategy) -> LfsResult<()> {
        let key = key(workspace);
        let Some(path) = &self.path else {
            self.entries.write().insert(key, strategy);
            return Ok(());
        };

        let guard = lock_store(path)?;
        let mut on_disk = read_store(path)?;
        on_disk.version = STORE_VERSION;
        on_disk.repositories.insert(key.clone(), strategy);
        write_store(path, &on_disk)?;
        drop(guard);

        *self.entries.write() = on_disk.repositories;
        info!(workspace = %key, strategy = %strategy, "media strategy saved");
        Ok(())
    }

    /// Returns all entries.
    pub fn entries(&self) -> BTreeMap<String, RepoStrategy> {
        self.entries.read().clone()
    }
}

fn key(workspace: &Path) -> String {
    let absolute = fs::canonicalize(workspace).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(workspace))
            .unwrap_or_else(|_| workspace.to_path_buf())
    });
    absolute.to_string_lossy().into_owned()
}

fn read_store(path: &Path) -> LfsResult<StoreFile> {
    match fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Ok(StoreFile::default()),
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
            LfsError::StrategyStore(format!("{}: {e}", path.display()))
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StoreFile::default()),
        Err(e) => Err(LfsError::io(path, e)),
    }
}

fn lock_store(path: &Path) -> LfsResult<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| LfsError::io(parent, e))?;
    }
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| LfsError::io(&lock_path, e))?;
    file.lock_exclusive()
        .map_err(|e| LfsError::io(&lock_path, e))?;
    Ok(file)
}

fn write_store(path: &Path, store: &StoreFile) -> LfsResult<()> {
    let temp = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(store)
        .map_err(|e| LfsError::StrategyStore(e.to_string()))?;
    let mut file = File::create(&temp).map_err(|e| LfsError::io(&temp, e))?;
    file.write_all(&data)
        .and_then(|()| file.sync_all())
        .map_err(|e| LfsError::io(&temp, e))?;
    drop(file);
    fs::rename(&temp, path).map_err(|e| LfsError::io(path, e))
}
