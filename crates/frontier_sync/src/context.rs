//! Process-wide state shared by every engine.

use crate::config::SyncConfig;
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::probe::{RemoteProbe, TcpProbe};
use frontier_lfs::{HttpClient, LargeFiles, LfsError, ReqwestClient, StrategyStore};
use frontier_lock::{cleanup_on_startup, SyncLock};
use git2::Repository;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Explicit replacement for a process-wide singleton.
///
/// Create one per process with [`SyncContext::init`], open engines from it,
/// and call [`SyncContext::shutdown`] before exit. Tests create as many
/// isolated contexts as they like.
pub struct SyncContext {
    config: SyncConfig,
    large_files: LargeFiles,
    probe: Arc<dyn RemoteProbe>,
    cleaned: Mutex<HashSet<PathBuf>>,
    locks: Mutex<Vec<Weak<SyncLock>>>,
}

impl SyncContext {
    /// Creates a context from explicit collaborators.
    pub fn init(
        config: SyncConfig,
        http: Arc<dyn HttpClient>,
        strategies: Arc<StrategyStore>,
        probe: Arc<dyn RemoteProbe>,
    ) -> Arc<Self> {
        let large_files = LargeFiles::new(config.lfs.clone(), http, strategies);
        Arc::new(Self {
            config,
            large_files,
            probe,
            cleaned: Mutex::new(HashSet::new()),
            locks: Mutex::new(Vec::new()),
        })
    }

    /// Creates a context with the `reqwest` transport and a TCP probe.
    pub fn with_defaults(
        config: SyncConfig,
        strategies: Arc<StrategyStore>,
    ) -> SyncResult<Arc<Self>> {
        let http = ReqwestClient::new(config.lfs.http_timeout, config.lfs.connect_timeout)
            .map_err(|e| SyncError::from(LfsError::from(e)))?;
        let probe = TcpProbe::new(config.connect_timeout);
        Ok(Self::init(config, Arc::new(http), strategies, Arc::new(probe)))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the large-file subsystem.
    pub fn large_files(&self) -> &LargeFiles {
        &self.large_files
    }

    pub(crate) fn probe(&self) -> &dyn RemoteProbe {
        self.probe.as_ref()
    }

    /// Opens an engine for the repository at `workspace`.
    ///
    /// Unless [`SyncConfig::startup_cleanup`] is off, the first open of a
    /// workspace in this context removes any lock left behind by an earlier
    /// process.
    pub fn open(self: &Arc<Self>, workspace: impl AsRef<Path>) -> SyncResult<SyncEngine> {
        let workspace = workspace.as_ref();
        let repo = Repository::open(workspace).map_err(|e| {
            SyncError::PreconditionFailure(format!(
                "{} is not a repository: {}",
                workspace.display(),
                e.message()
            ))
        })?;
        let root = repo
            .workdir()
            .ok_or_else(|| {
                SyncError::PreconditionFailure(format!(
                    "{} has no working tree",
                    workspace.display()
                ))
            })?
            .to_path_buf();
        let root = fs::canonicalize(&root).map_err(|e| SyncError::io(&root, e))?;

        let first_open = self.cleaned.lock().insert(root.clone());
        if first_open && self.config.startup_cleanup && cleanup_on_startup(&root)? {
            info!(workspace = %root.display(), "removed sync lock left by a previous process");
        }

        let lock = Arc::new(SyncLock::new(&root, self.config.lock.clone())?);
        {
            let mut locks = self.locks.lock();
            locks.retain(|weak| weak.strong_count() > 0);
            locks.push(Arc::downgrade(&lock));
        }
        debug!(workspace = %root.display(), "opened sync engine");
        Ok(SyncEngine::new(Arc::clone(self), root, lock))
    }

    /// Releases every lease still held by engines of this context.
    pub fn shutdown(&self) {
        let locks: Vec<_> = self.locks.lock().drain(..).collect();
        for lock in locks.iter().filter_map(Weak::upgrade) {
            if lock.is_held() {
                warn!(workspace = %lock.workspace().display(), "releasing sync lock at shutdown");
                lock.release();
            }
        }
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .field("workspaces", &self.cleaned.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::StaticProbe;
    use frontier_lfs::{HttpRequest, HttpResponse, TransportError};
    use frontier_lock::{check_filesystem_lock, lock_path, LockState};
    use tempfile::tempdir;

    struct NoNetwork;

    impl HttpClient for NoNetwork {
        fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Unreachable("offline".into()))
        }
    }

    fn context() -> Arc<SyncContext> {
        context_with(SyncConfig::default())
    }

    fn context_with(config: SyncConfig) -> Arc<SyncContext> {
        SyncContext::init(
            config,
            Arc::new(NoNetwork),
            Arc::new(StrategyStore::in_memory()),
            Arc::new(StaticProbe(false)),
        )
    }

    #[test]
    fn open_requires_a_repository() {
        let dir = tempdir().unwrap();
        let err = context().open(dir.path()).unwrap_err();
        assert!(matches!(err, SyncError::PreconditionFailure(_)));
    }

    #[test]
    fn first_open_cleans_leftover_lock_once() {
        let dir = tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let path = lock_path(dir.path()).unwrap();
        fs::write(&path, br#"{"pid":1,"timestamp":1}"#).unwrap();

        let ctx = context();
        let first = ctx.open(dir.path()).unwrap();
        assert!(!path.exists());

        let guard = first.lock().try_lock().unwrap().unwrap();
        let _second = ctx.open(dir.path()).unwrap();
        assert!(path.exists(), "second open must not remove a live lease");
        drop(guard);
    }

    #[test]
    fn startup_cleanup_can_be_disabled() {
        let dir = tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let path = lock_path(dir.path()).unwrap();
        fs::write(&path, br#"{"pid":1,"timestamp":1}"#).unwrap();

        let ctx = context_with(SyncConfig::default().with_startup_cleanup(false));
        ctx.open(dir.path()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn shutdown_releases_held_leases() {
        let dir = tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let ctx = context();
        let engine = ctx.open(dir.path()).unwrap();
        let guard = engine.lock().try_lock().unwrap().unwrap();

        ctx.shutdown();
        let status = check_filesystem_lock(dir.path(), &ctx.config().lock).unwrap();
        assert_eq!(status.state, LockState::Free);
        drop(guard);
    }
}
