//! Lease file location and read-only inspection.

use crate::config::LockConfig;
use crate::error::{LockError, LockResult};
use crate::lease::{classify, now_ms, LockLease, LockState, Progress};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// File name of the lease inside the metadata directory.
pub const LOCK_FILE_NAME: &str = "frontier-sync.lock";

/// Resolves the repository metadata directory of `workspace`.
///
/// Handles both a `.git` directory and a `.git` file pointing elsewhere
/// (worktrees and submodules).
pub fn metadata_dir(workspace: &Path) -> LockResult<PathBuf> {
    let dot_git = workspace.join(".git");
    let meta = fs::metadata(&dot_git).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LockError::NotARepository(workspace.to_path_buf()),
        _ => LockError::io(&dot_git, e),
    })?;
    if meta.is_dir() {
        return Ok(dot_git);
    }

    let content = fs::read_to_string(&dot_git).map_err(|e| LockError::io(&dot_git, e))?;
    let target = content
        .lines()
        .find_map(|line| line.strip_prefix("gitdir:"))
        .map(str::trim)
        .ok_or_else(|| LockError::NotARepository(workspace.to_path_buf()))?;
    let target = Path::new(target);
    Ok(if target.is_absolute() {
        target.to_path_buf()
    } else {
        workspace.join(target)
    })
}

/// Returns the lease path for `workspace`.
pub fn lock_path(workspace: &Path) -> LockResult<PathBuf> {
    Ok(metadata_dir(workspace)?.join(LOCK_FILE_NAME))
}

/// Reads lease bytes. `None` if the file does not exist.
pub(crate) fn read_lease_bytes(path: &Path) -> LockResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LockError::io(path, e)),
    }
}

/// Removes the lease at `path`. Returns true if a file was removed.
pub(crate) fn remove_lease(path: &Path) -> LockResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LockError::io(path, e)),
    }
}

/// Snapshot of a workspace's lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatus {
    /// Classification at the time of the read.
    pub state: LockState,
    /// Holder pid, if recorded.
    pub pid: Option<u32>,
    /// Holder's current phase.
    pub phase: Option<String>,
    /// Time since the last heartbeat.
    pub heartbeat_age: Option<Duration>,
    /// Time since the last forward progress.
    pub progress_age: Option<Duration>,
    /// Holder's progress counter.
    pub progress: Option<Progress>,
}

impl LockStatus {
    fn free() -> Self {
        Self {
            state: LockState::Free,
            pid: None,
            phase: None,
            heartbeat_age: None,
            progress_age: None,
            progress: None,
        }
    }

    pub(crate) fn observe(bytes: &[u8], now: u64, config: &LockConfig) -> Self {
        let lease = LockLease::parse(bytes);
        let state = classify(lease.as_ref(), now, config);
        match lease {
            Some(lease) => Self {
                state,
                pid: lease.pid,
                heartbeat_age: Some(lease.heartbeat_age(now)),
                progress_age: Some(lease.progress_age(now)),
                phase: lease.phase,
                progress: lease.progress,
            },
            None => Self {
                state,
                ..Self::free()
            },
        }
    }
}

/// Classifies the lease of `workspace` without modifying anything.
///
/// Safe to call from any process at any time.
pub fn check_filesystem_lock(workspace: &Path, config: &LockConfig) -> LockResult<LockStatus> {
    let path = lock_path(workspace)?;
    Ok(match read_lease_bytes(&path)? {
        Some(bytes) => LockStatus::observe(&bytes, now_ms(), config),
        None => LockStatus::free(),
    })
}

/// Removes any lease left in `workspace` by an earlier process.
///
/// A sync never resumes across a restart, so whatever lease exists when a
/// process starts is obsolete. Returns true if a file was removed.
pub fn cleanup_on_startup(workspace: &Path) -> LockResult<bool> {
    let path = lock_path(workspace)?;
    let removed = remove_lease(&path)?;
    if removed {
        info!(path = %path.display(), "removed sync lock left by a previous process");
    }
    Ok(removed)
}

/// Removes the lease of `workspace` whatever its state.
///
/// Meant for a stuck lock the user chose to break. Returns true if a file
/// was removed.
pub fn force_release(workspace: &Path) -> LockResult<bool> {
    let path = lock_path(workspace)?;
    let holder = read_lease_bytes(&path)?
        .and_then(|bytes| LockLease::parse(&bytes))
        .and_then(|lease| lease.pid);
    let removed = remove_lease(&path)?;
    if removed {
        warn!(path = %path.display(), pid = ?holder, "sync lock forcibly released");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn metadata_dir_variants() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            metadata_dir(dir.path()),
            Err(LockError::NotARepository(_))
        ));

        fs::create_dir(dir.path().join(".git")).unwrap();
        assert_eq!(metadata_dir(dir.path()).unwrap(), dir.path().join(".git"));

        let linked = tempdir().unwrap();
        fs::write(linked.path().join(".git"), "gitdir: ../elsewhere/.git\n").unwrap();
        assert_eq!(
            metadata_dir(linked.path()).unwrap(),
            linked.path().join("../elsewhere/.git")
        );
    }

    #[test]
    fn status_of_missing_and_garbage() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let config = LockConfig::default();

        let status = check_filesystem_lock(dir.path(), &config).unwrap();
        assert_eq!(status.state, LockState::Free);

        fs::write(lock_path(dir.path()).unwrap(), b"{{{{").unwrap();
        let status = check_filesystem_lock(dir.path(), &config).unwrap();
        assert_eq!(status.state, LockState::Dead);
        assert_eq!(status.pid, None);
    }

    #[test]
    fn status_reports_holder() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let mut lease = LockLease::new(4242, now_ms());
        lease.phase = Some("fetching".into());
        fs::write(
            lock_path(dir.path()).unwrap(),
            serde_json::to_vec(&lease).unwrap(),
        )
        .unwrap();

        let status = check_filesystem_lock(dir.path(), &LockConfig::default()).unwrap();
        assert_eq!(status.state, LockState::Active);
        assert_eq!(status.pid, Some(4242));
        assert_eq!(status.phase.as_deref(), Some("fetching"));
    }

    #[test]
    fn startup_cleanup_is_unconditional() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let path = lock_path(dir.path()).unwrap();
        let live = LockLease::new(std::process::id(), now_ms());
        fs::write(&path, serde_json::to_vec(&live).unwrap()).unwrap();

        assert!(cleanup_on_startup(dir.path()).unwrap());
        assert!(!path.exists());
        assert!(!cleanup_on_startup(dir.path()).unwrap());
    }

    #[test]
    fn force_release_removes_live_lease() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let path = lock_path(dir.path()).unwrap();
        let live = LockLease::new(std::process::id(), now_ms());
        fs::write(&path, serde_json::to_vec(&live).unwrap()).unwrap();

        assert!(force_release(dir.path()).unwrap());
        assert_eq!(
            check_filesystem_lock(dir.path(), &LockConfig::default()).unwrap().state,
            LockState::Free
        );
    }
}
