//! Error types for the sync engine.
//!
//! Version-control and transfer failures are translated here, at the
//! boundary of every public operation, so callers only ever see the
//! variants below. Merge conflicts are not errors; they come back as a
//! [`SyncOutcome`](crate::SyncOutcome).

use frontier_lfs::{LfsError, TransportError};
use frontier_lock::LockError;
use frontier_maintenance::MaintenanceError;
use git2::{ErrorClass, ErrorCode};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Another sync holds the workspace lease.
    #[error("a sync is already in progress for {}", .0.display())]
    LockContention(PathBuf),

    /// The repository is not in a state that can be synced.
    #[error("cannot sync: {0}")]
    PreconditionFailure(String),

    /// The remote host could not be reached.
    #[error("remote host is unreachable: {0}")]
    HostUnreachable(String),

    /// The connection to the remote timed out.
    #[error("connection to the remote timed out: {0}")]
    ConnectionTimeout(String),

    /// The remote rejected the credentials.
    #[error("authentication failed; re-authenticate and try again")]
    AuthenticationFailed,

    /// The credentials lack access to the repository.
    #[error("access denied; re-authenticate with an account that can access this repository")]
    AccessDenied,

    /// The remote branch moved while this sync was running.
    #[error("the remote changed since the last sync; sync again")]
    RemoteChangedSinceSync,

    /// Uncommitted changes remain where the working tree must be clean.
    #[error("working tree has uncommitted changes: {}", .0.join(", "))]
    DirtyWorkingTree(Vec<String>),

    /// Large-file staging or transfer failed.
    #[error(transparent)]
    Lfs(LfsError),

    /// The lease file could not be read or written.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Object store maintenance failed.
    #[error(transparent)]
    Maintenance(#[from] MaintenanceError),

    /// Any other version-control failure.
    #[error("git error: {0}")]
    Git(git2::Error),

    /// Filesystem error.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::HostUnreachable(_)
            | SyncError::ConnectionTimeout(_)
            | SyncError::RemoteChangedSinceSync => true,
            SyncError::Lfs(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns what the user should do about this error, if anything.
    pub fn remedy(&self) -> Option<&'static str> {
        match self {
            SyncError::LockContention(_) => Some("wait for the running sync to finish"),
            SyncError::PreconditionFailure(_) => {
                Some("check out a branch and configure an origin remote")
            }
            SyncError::HostUnreachable(_) | SyncError::ConnectionTimeout(_) => {
                Some("check the network connection and sync again later")
            }
            SyncError::AuthenticationFailed | SyncError::AccessDenied => Some("re-authenticate"),
            SyncError::RemoteChangedSinceSync => Some("sync again"),
            SyncError::DirtyWorkingTree(_) => Some("commit or discard the listed changes"),
            _ => None,
        }
    }
}

/// Translates a `git2` failure into the sync taxonomy.
pub fn classify_git_error(err: git2::Error) -> SyncError {
    let message = err.message().to_ascii_lowercase();
    let contains = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

    if err.code() == ErrorCode::Auth || contains(&["401", "authentication", "credentials"]) {
        SyncError::AuthenticationFailed
    } else if contains(&["403", "forbidden", "permission denied", "access denied"]) {
        SyncError::AccessDenied
    } else if err.code() == ErrorCode::NotFastForward
        || contains(&["non-fast-forward", "non-fastforward", "fetch first", "rejected"])
    {
        SyncError::RemoteChangedSinceSync
    } else if contains(&["timed out", "timeout"]) {
        SyncError::ConnectionTimeout(err.message().to_string())
    } else if matches!(err.class(), ErrorClass::Net | ErrorClass::Ssh | ErrorClass::Http)
        || contains(&[
            "could not resolve",
            "failed to connect",
            "connection refused",
            "unreachable",
        ])
    {
        SyncError::HostUnreachable(err.message().to_string())
    } else {
        SyncError::Git(err)
    }
}

impl From<git2::Error> for SyncError {
    fn from(err: git2::Error) -> Self {
        classify_git_error(err)
    }
}

impl From<LfsError> for SyncError {
    fn from(err: LfsError) -> Self {
        match err {
            LfsError::AuthenticationFailed => SyncError::AuthenticationFailed,
            LfsError::AccessDenied => SyncError::AccessDenied,
            LfsError::Transport(TransportError::Unreachable(m)) => SyncError::HostUnreachable(m),
            LfsError::Transport(TransportError::Timeout(m)) => SyncError::ConnectionTimeout(m),
            LfsError::Git(e) => classify_git_error(e),
            other => SyncError::Lfs(other),
        }
    }
}
