//! # Frontier Lock
//!
//! Cross-process sync lease for a single workspace.
//!
//! One JSON lease file lives in the repository metadata directory:
//!
//! ```text
//! <workspace>/.git/frontier-sync.lock
//! ```
//!
//! This crate provides:
//! - `SyncLock`: acquire, release and heartbeat a lease
//! - `LeaseGuard`: RAII ownership with a background heartbeat thread
//! - `check_filesystem_lock`: read-only classification (active, stuck, dead)
//! - `cleanup_on_startup`: removal of leases left by a previous process
//! - `force_release`: explicit removal of a stuck lease
//!
//! ## Liveness
//!
//! A lease is classified on every read, never stored:
//! - **dead**: heartbeat older than the heartbeat timeout, unparsable, or a
//!   legacy pid-less lease older than the legacy timeout
//! - **stuck**: heartbeat fresh, but no forward progress within the progress
//!   timeout and no CPU-bound grace period applies
//! - **active**: everything else
//!
//! Only dead leases are ever reclaimed automatically. A stuck lease is
//! reported so the caller can warn the user.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod lease;
mod lock;
mod process;
mod status;

pub mod phase;

pub use config::LockConfig;
pub use error::{LockError, LockResult};
pub use lease::{classify, now_ms, LockLease, LockState, Progress};
pub use lock::{HeartbeatGuard, LeaseGuard, SyncLock};
pub use process::is_process_alive;
pub use status::{
    check_filesystem_lock, cleanup_on_startup, force_release, lock_path, metadata_dir, LockStatus,
    LOCK_FILE_NAME,
};
