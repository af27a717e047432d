//! Lease acquisition, heartbeat and release.

use crate::config::LockConfig;
use crate::error::{LockError, LockResult};
use crate::lease::{classify, now_ms, LockLease, LockState, Progress};
use crate::process::is_process_alive;
use crate::status::{lock_path, read_lease_bytes, remove_lease, LOCK_FILE_NAME};
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Create attempts before acquisition gives up.
///
/// The second attempt only happens after a dead lease was removed.
const MAX_ACQUIRE_ATTEMPTS: usize = 2;

/// The sync lease of one workspace, as seen by this process.
///
/// Each instance tracks whether *it* holds the lease. Two instances for
/// the same workspace in one process exclude each other through the file,
/// exactly like two processes do.
#[derive(Debug)]
pub struct SyncLock {
    workspace: PathBuf,
    path: PathBuf,
    config: LockConfig,
    pid: u32,
    held: Mutex<Option<LockLease>>,
}

impl SyncLock {
    /// Creates a handle for the lease of `workspace`.
    ///
    /// # Errors
    ///
    /// Returns `NotARepository` if `workspace` has no metadata directory.
    pub fn new(workspace: &Path, config: LockConfig) -> LockResult<Self> {
        Ok(Self {
            workspace: workspace.to_path_buf(),
            path: lock_path(workspace)?,
            config,
            pid: std::process::id(),
            held: Mutex::new(None),
        })
    }

    /// Returns the workspace this lease guards.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Returns the lease file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Returns true if this instance currently holds the lease.
    pub fn is_held(&self) -> bool {
        self.held.lock().is_some()
    }

    /// Tries to take the lease without blocking.
    ///
    /// Returns `Ok(false)` when someone else holds a live lease. A dead
    /// lease is re-read after `recheck_delay` and removed only if it is
    /// unchanged, then creation is retried once.
    pub fn acquire(&self) -> LockResult<bool> {
        let mut held = self.held.lock();
        if held.is_some() {
            return Ok(false);
        }

        for attempt in 0..MAX_ACQUIRE_ATTEMPTS {
            let lease = LockLease::new(self.pid, now_ms());
            match self.create_exclusive(&lease) {
                Ok(()) => {
                    debug!(path = %self.path.display(), attempt, "sync lock acquired");
                    *held = Some(lease);
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(LockError::io(&self.path, e)),
            }

            let Some(observed) = read_lease_bytes(&self.path)? else {
                // Released between our create and our read.
                continue;
            };
            if !self.is_reclaimable(&observed) {
                return Ok(false);
            }

            if !self.config.recheck_delay.is_zero() {
                thread::sleep(self.config.recheck_delay);
            }
            match read_lease_bytes(&self.path)? {
                Some(again) if again != observed => {
                    debug!(
                        path = %self.path.display(),
                        "lock changed during re-check, holder is alive"
                    );
                    return Ok(false);
                }
                Some(_) => {
                    remove_lease(&self.path)?;
                    info!(path = %self.path.display(), "reclaimed dead sync lock");
                }
                None => {}
            }
        }

        Ok(false)
    }

    /// Releases the lease if this instance holds it.
    ///
    /// A lease that already disappeared is fine. A lease that now names a
    /// different process is left alone. Removal errors are logged; the
    /// in-memory flag is cleared either way.
    pub fn release(&self) {
        let mut held = self.held.lock();
        if held.take().is_none() {
            return;
        }

        match read_lease_bytes(&self.path) {
            Ok(None) => {
                debug!(path = %self.path.display(), "sync lock already removed");
                return;
            }
            Ok(Some(bytes)) => {
                if let Some(lease) = LockLease::parse(&bytes) {
                    if lease.pid != Some(self.pid) {
                        warn!(
                            path = %self.path.display(),
                            holder = ?lease.pid,
                            "sync lock taken over by another process, not removing"
                        );
                        return;
                    }
                }
            }
            Err(e) => warn!(error = %e, "could not read sync lock before release"),
        }

        match remove_lease(&self.path) {
            Ok(_) => debug!(path = %self.path.display(), "sync lock released"),
            Err(e) => warn!(error = %e, "failed to remove sync lock"),
        }
    }

    /// Records a heartbeat with the current phase and optional progress.
    ///
    /// `timestamp` is always advanced. `lastProgress` moves only when the
    /// phase changes or the counter advances; `phaseChangedAt` only when
    /// the phase changes. Returns `Ok(false)` without writing anything if
    /// this instance does not hold the lease.
    pub fn update_heartbeat(&self, phase: &str, progress: Option<Progress>) -> LockResult<bool> {
        self.rewrite(Some(phase), progress)
    }

    /// Advances only the heartbeat timestamp.
    pub fn refresh(&self) -> LockResult<bool> {
        self.rewrite(None, None)
    }

    /// Acquires the lease and wraps it in a guard that heartbeats in the
    /// background and releases on drop.
    pub fn try_lock(self: &Arc<Self>) -> LockResult<Option<LeaseGuard>> {
        if !self.acquire()? {
            return Ok(None);
        }
        let heartbeat = match HeartbeatGuard::spawn(Arc::clone(self)) {
            Ok(heartbeat) => heartbeat,
            Err(e) => {
                self.release();
                return Err(e);
            }
        };
        Ok(Some(LeaseGuard {
            lock: Arc::clone(self),
            heartbeat: Some(heartbeat),
        }))
    }

    fn is_reclaimable(&self, bytes: &[u8]) -> bool {
        let lease = LockLease::parse(bytes);
        if let Some(pid) = lease.as_ref().and_then(|l| l.pid) {
            if !is_process_alive(pid) {
                return true;
            }
        }
        classify(lease.as_ref(), now_ms(), &self.config) == LockState::Dead
    }

    fn create_exclusive(&self, lease: &LockLease) -> io::Result<()> {
        let data = serde_json::to_vec(lease)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        let written = file.write_all(&data).and_then(|()| file.sync_all());
        if let Err(e) = written {
            drop(file);
            let _ = fs::remove_file(&self.path);
            return Err(e);
        }
        Ok(())
    }

    fn rewrite(&self, phase: Option<&str>, progress: Option<Progress>) -> LockResult<bool> {
        let mut held = self.held.lock();
        let Some(previous) = held.as_ref() else {
            return Ok(false);
        };

        let on_disk = read_lease_bytes(&self.path)?.and_then(|b| LockLease::parse(&b));
        if on_disk.and_then(|l| l.pid) != Some(self.pid) {
            warn!(path = %self.path.display(), "sync lock no longer owned by this process");
            *held = None;
            return Ok(false);
        }

        let now = now_ms().max(previous.timestamp + 1);
        let next = next_lease(previous, now, phase, progress);
        self.write_atomic(&next)?;
        *held = Some(next);
        Ok(true)
    }

    fn write_atomic(&self, lease: &LockLease) -> LockResult<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let temp = dir.join(format!(".{LOCK_FILE_NAME}.{}.tmp", Uuid::new_v4()));
        let data = serde_json::to_vec(lease)?;

        let result = (|| -> io::Result<()> {
            let mut file = fs::File::create(&temp)?;
            file.write_all(&data)?;
            file.sync_all()?;
            drop(file);
            fs::rename(&temp, &self.path)
        })();

        result.map_err(|e| {
            let _ = fs::remove_file(&temp);
            LockError::io(&self.path, e)
        })
    }
}

fn next_lease(
    previous: &LockLease,
    now: u64,
    phase: Option<&str>,
    progress: Option<Progress>,
) -> LockLease {
    let mut next = previous.clone();
    next.timestamp = now;

    let Some(phase) = phase else {
        return next;
    };

    let phase_changed = previous.phase.as_deref() != Some(phase);
    let advanced = phase_changed
        || match (&previous.progress, &progress) {
            (Some(old), Some(new)) => new.current > old.current || new.total != old.total,
            (None, Some(_)) => true,
            (_, None) => false,
        };

    if phase_changed {
        next.phase = Some(phase.to_string());
        next.phase_changed_at = Some(now);
        next.progress = progress;
    } else if progress.is_some() {
        next.progress = progress;
    }
    if advanced {
        next.last_progress = Some(now);
    }
    next
}

/// Exclusive ownership of the lease for the lifetime of the guard.
#[derive(Debug)]
pub struct LeaseGuard {
    lock: Arc<SyncLock>,
    heartbeat: Option<HeartbeatGuard>,
}

impl LeaseGuard {
    /// Records a phase change or progress.
    pub fn update(&self, phase: &str, progress: Option<Progress>) {
        if let Err(e) = self.lock.update_heartbeat(phase, progress) {
            warn!(error = %e, phase, "failed to update sync lock heartbeat");
        }
    }

    /// Returns the underlying lock.
    pub fn lock(&self) -> &SyncLock {
        &self.lock
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        // Stop heartbeating before the file goes away.
        drop(self.heartbeat.take());
        self.lock.release();
    }
}

/// Background thread that refreshes the lease timestamp.
///
/// Keeps a live owner from looking dead while it sits in a long blocking
/// call. Stops when dropped or when the lease is lost.
#[derive(Debug)]
pub struct HeartbeatGuard {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatGuard {
    /// Starts heartbeating `lock` every `heartbeat_interval`.
    pub fn spawn(lock: Arc<SyncLock>) -> LockResult<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let interval: Duration = lock.config.heartbeat_interval;
        let path = lock.path.clone();
        let handle = thread::Builder::new()
            .name("frontier-heartbeat".into())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match lock.refresh() {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => warn!(error = %e, "heartbeat refresh failed"),
                    },
                    _ => break,
                }
            })
            .map_err(|e| LockError::io(path, e))?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase;
    use tempfile::{tempdir, TempDir};

    fn workspace() -> TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        dir
    }

    fn config() -> LockConfig {
        LockConfig::default().with_recheck_delay(Duration::ZERO)
    }

    fn on_disk(lock: &SyncLock) -> LockLease {
        LockLease::parse(&fs::read(lock.path()).unwrap()).unwrap()
    }

    fn plant(dir: &Path, lease: &LockLease) {
        fs::write(lock_path(dir).unwrap(), serde_json::to_vec(lease).unwrap()).unwrap();
    }

    #[test]
    fn acquire_and_release() {
        let dir = workspace();
        let lock = SyncLock::new(dir.path(), config()).unwrap();

        assert!(lock.acquire().unwrap());
        assert!(lock.is_held());
        assert_eq!(on_disk(&lock).pid, Some(std::process::id()));

        // Same instance does not re-enter.
        assert!(!lock.acquire().unwrap());

        lock.release();
        assert!(!lock.is_held());
        assert!(!lock.path().exists());
        lock.release();
    }

    #[test]
    fn live_lock_blocks_second_instance() {
        let dir = workspace();
        let first = SyncLock::new(dir.path(), config()).unwrap();
        let second = SyncLock::new(dir.path(), config()).unwrap();

        assert!(first.acquire().unwrap());
        assert!(!second.acquire().unwrap());
        assert!(first.path().exists());

        first.release();
        assert!(second.acquire().unwrap());
        second.release();
    }

    #[cfg(unix)]
    #[test]
    fn dead_holder_is_reclaimed() {
        let dir = workspace();
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();
        plant(dir.path(), &LockLease::new(dead_pid, now_ms()));

        let lock = SyncLock::new(dir.path(), config()).unwrap();
        assert!(lock.acquire().unwrap());
        assert_eq!(on_disk(&lock).pid, Some(std::process::id()));
        lock.release();
    }

    #[test]
    fn expired_heartbeat_is_reclaimed() {
        let dir = workspace();
        plant(dir.path(), &LockLease::new(std::process::id(), now_ms() - 600_000));

        let lock = SyncLock::new(dir.path(), config()).unwrap();
        assert!(lock.acquire().unwrap());
        lock.release();
    }

    #[test]
    fn unparsable_lock_is_reclaimed() {
        let dir = workspace();
        fs::write(lock_path(dir.path()).unwrap(), b"").unwrap();

        let lock = SyncLock::new(dir.path(), config()).unwrap();
        assert!(lock.acquire().unwrap());
        lock.release();
    }

    #[test]
    fn fresh_legacy_lock_is_respected() {
        let dir = workspace();
        let mut legacy = LockLease::new(0, now_ms());
        legacy.pid = None;
        plant(dir.path(), &legacy);

        let lock = SyncLock::new(dir.path(), config()).unwrap();
        assert!(!lock.acquire().unwrap());
    }

    #[test]
    fn heartbeat_is_noop_without_lease() {
        let dir = workspace();
        let lock = SyncLock::new(dir.path(), config()).unwrap();
        assert!(!lock.update_heartbeat(phase::FETCHING, None).unwrap());
        assert!(!lock.path().exists());
    }

    #[test]
    fn heartbeat_tracks_phase_and_progress() {
        let dir = workspace();
        let lock = SyncLock::new(dir.path(), config()).unwrap();
        assert!(lock.acquire().unwrap());
        let acquired = on_disk(&lock);

        assert!(lock.update_heartbeat(phase::TRANSFERRING, None).unwrap());
        let first = on_disk(&lock);
        assert!(first.timestamp > acquired.timestamp);
        assert_eq!(first.phase.as_deref(), Some(phase::TRANSFERRING));
        assert_eq!(first.phase_changed_at, Some(first.timestamp));
        assert_eq!(first.last_progress, Some(first.timestamp));

        lock.update_heartbeat(phase::TRANSFERRING, Some(Progress::new(1, 3, "objects")))
            .unwrap();
        let second = on_disk(&lock);
        assert_eq!(second.phase_changed_at, first.phase_changed_at);
        assert_eq!(second.last_progress, Some(second.timestamp));

        // Same counter again: heartbeat only.
        lock.update_heartbeat(phase::TRANSFERRING, Some(Progress::new(1, 3, "objects")))
            .unwrap();
        let third = on_disk(&lock);
        assert!(third.timestamp > second.timestamp);
        assert_eq!(third.last_progress, second.last_progress);
        assert_eq!(third.progress.as_ref().map(|p| p.current), Some(1));

        lock.refresh().unwrap();
        let fourth = on_disk(&lock);
        assert!(fourth.timestamp > third.timestamp);
        assert_eq!(fourth.phase, third.phase);
        assert_eq!(fourth.last_progress, third.last_progress);
        lock.release();
    }

    #[test]
    fn lost_lease_is_not_touched() {
        let dir = workspace();
        let lock = SyncLock::new(dir.path(), config()).unwrap();
        assert!(lock.acquire().unwrap());

        let intruder = LockLease::new(std::process::id().wrapping_add(1), now_ms());
        plant(dir.path(), &intruder);

        assert!(!lock.update_heartbeat(phase::PUSHING, None).unwrap());
        assert!(!lock.is_held());
        lock.release();
        assert_eq!(on_disk(&lock), intruder);
    }

    #[test]
    fn guard_releases_on_drop() {
        let dir = workspace();
        let lock = Arc::new(SyncLock::new(dir.path(), config()).unwrap());
        {
            let guard = lock.try_lock().unwrap().expect("lock should be free");
            guard.update(phase::STARTING, None);
            assert!(lock.path().exists());
            assert!(lock.try_lock().unwrap().is_none());
        }
        assert!(!lock.path().exists());
        assert!(!lock.is_held());
    }

    #[test]
    fn background_heartbeat_refreshes() {
        let dir = workspace();
        let config = config().with_heartbeat_interval(Duration::from_millis(10));
        let lock = Arc::new(SyncLock::new(dir.path(), config).unwrap());
        let guard = lock.try_lock().unwrap().unwrap();
        let before = on_disk(&lock).timestamp;

        thread::sleep(Duration::from_millis(100));
        assert!(on_disk(&lock).timestamp > before);
        drop(guard);
        assert!(!lock.path().exists());
    }
}
