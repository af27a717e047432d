//! The large-file facade shared by staging and reconciliation.

use crate::client::{batch_endpoint, BatchClient};
use crate::config::LfsConfig;
use crate::error::{LfsError, LfsResult};
use crate::http::HttpClient;
use crate::layout::LargeFileLayout;
use crate::strategy::StrategyStore;
use crate::tracking::TrackedPaths;
use frontier_lfs_protocol::{ObjectId, Pointer};
use git2::Repository;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Remote whose URL the batch endpoint is derived from.
pub const ORIGIN: &str = "origin";

/// Progress through one transfer pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Objects handled so far.
    pub completed: u64,
    /// Objects in the pass.
    pub total: u64,
}

/// One object that could not be transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    /// Object identifier.
    pub oid: ObjectId,
    /// Workspace-relative paths that refer to the object.
    pub paths: Vec<PathBuf>,
    /// What went wrong.
    pub message: String,
}

/// Large-file operations for any number of workspaces.
///
/// Holds no per-workspace state. The batch client is created only when a
/// pass actually has objects to transfer, so workspaces without large
/// files never need an endpoint.
pub struct LargeFiles {
    config: LfsConfig,
    http: Arc<dyn HttpClient>,
    strategies: Arc<StrategyStore>,
}

impl LargeFiles {
    /// Creates the facade.
    pub fn new(
        config: LfsConfig,
        http: Arc<dyn HttpClient>,
        strategies: Arc<StrategyStore>,
    ) -> Self {
        Self {
            config,
            http,
            strategies,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LfsConfig {
        &self.config
    }

    /// Returns the side-directory layout.
    pub fn layout(&self) -> &LargeFileLayout {
        &self.config.layout
    }

    /// Returns the media strategy store.
    pub fn strategies(&self) -> &Arc<StrategyStore> {
        &self.strategies
    }

    /// Loads the tracked-path rules for `workdir`.
    pub fn tracked_paths(&self, workdir: &Path) -> LfsResult<TrackedPaths> {
        TrackedPaths::load(workdir, &self.config.tracked_patterns)
    }

    /// Builds a batch client for `repo`: the configured endpoint, or the
    /// one derived from the origin URL.
    pub fn batch_client(&self, repo: &Repository) -> LfsResult<BatchClient> {
        let endpoint = match &self.config.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                let remote = repo
                    .find_remote(ORIGIN)
                    .map_err(|_| LfsError::NoEndpoint(format!("no {ORIGIN} remote")))?;
                let url = remote
                    .url()
                    .ok_or_else(|| LfsError::NoEndpoint(format!("{ORIGIN} URL is not UTF-8")))?;
                batch_endpoint(url)?
            }
        };
        debug!(endpoint = %endpoint, "batch client ready");
        Ok(BatchClient::new(endpoint, self.http.clone()))
    }
}

pub(crate) fn workdir(repo: &Repository) -> LfsResult<&Path> {
    repo.workdir().ok_or(LfsError::BareRepository)
}

/// Reads at most enough bytes to classify a file as pointer or raw.
pub(crate) fn read_head(path: &Path) -> LfsResult<Vec<u8>> {
    let file = File::open(path).map_err(|e| LfsError::io(path, e))?;
    let limit = frontier_lfs_protocol::MAX_POINTER_SIZE as u64 + 1;
    let mut head = Vec::new();
    file.take(limit)
        .read_to_end(&mut head)
        .map_err(|e| LfsError::io(path, e))?;
    Ok(head)
}

pub(crate) fn hash_file(path: &Path) -> LfsResult<Pointer> {
    let file = File::open(path).map_err(|e| LfsError::io(path, e))?;
    Pointer::from_reader(io::BufReader::new(file)).map_err(|e| LfsError::io(path, e))
}

/// Returns true if `path` holds exactly the bytes `pointer` describes.
pub(crate) fn holds_content(path: &Path, pointer: &Pointer) -> LfsResult<bool> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() == pointer.size() => {
            Ok(hash_file(path)? == *pointer)
        }
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LfsError::io(path, e)),
    }
}

pub(crate) fn create_parent(path: &Path) -> LfsResult<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(|e| LfsError::io(parent, e)),
        None => Ok(()),
    }
}

/// Writes `bytes` to a new file at `path`.
///
/// Returns `false` without touching anything if the path already exists.
pub(crate) fn write_new(path: &Path, bytes: &[u8]) -> LfsResult<bool> {
    create_parent(path)?;
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(LfsError::io(path, e)),
    };
    if let Err(e) = file.write_all(bytes).and_then(|()| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(LfsError::io(path, e));
    }
    Ok(true)
}

/// Copies `from` over `to` through a temp file in the destination directory.
pub(crate) fn replace_with_copy(from: &Path, to: &Path) -> LfsResult<()> {
    create_parent(to)?;
    let temp = to.with_file_name(format!(".{}.tmp", uuid::Uuid::new_v4()));
    if let Err(e) = fs::copy(from, &temp) {
        let _ = fs::remove_file(&temp);
        return Err(LfsError::io(from, e));
    }
    fs::rename(&temp, to).map_err(|e| {
        let _ = fs::remove_file(&temp);
        LfsError::io(to, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpRequest, HttpResponse, TransportError};
    use tempfile::tempdir;

    struct Offline;

    impl HttpClient for Offline {
        fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Unreachable("offline".into()))
        }
    }

    fn facade(config: LfsConfig) -> LargeFiles {
        LargeFiles::new(config, Arc::new(Offline), Arc::new(StrategyStore::in_memory()))
    }

    #[test]
    fn endpoint_from_origin_or_override() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        repo.remote(ORIGIN, "https://git.example.com/team/repo.git").unwrap();

        let derived = facade(LfsConfig::default()).batch_client(&repo).unwrap();
        assert_eq!(
            derived.endpoint(),
            "https://git.example.com/team/repo.git/info/lfs/objects/batch"
        );

        let overridden = facade(LfsConfig::default().with_endpoint("http://127.0.0.1:1/batch"))
            .batch_client(&repo)
            .unwrap();
        assert_eq!(overridden.endpoint(), "http://127.0.0.1:1/batch");
    }

    #[test]
    fn missing_origin_has_no_endpoint() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        assert!(matches!(
            facade(LfsConfig::default()).batch_client(&repo),
            Err(LfsError::NoEndpoint(_))
        ));
    }

    #[test]
    fn write_new_never_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a/b/c.bin");
        assert!(write_new(&path, b"first").unwrap());
        assert!(!write_new(&path, b"second").unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"first");
    }

    #[test]
    fn holds_content_checks_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.bin");
        fs::write(&path, b"payload").unwrap();
        assert!(holds_content(&path, &Pointer::from_content(b"payload")).unwrap());
        assert!(!holds_content(&path, &Pointer::from_content(b"payloaX")).unwrap());
        assert!(!holds_content(&dir.path().join("missing"), &Pointer::from_content(b"")).unwrap());
    }
}
