//! Error types for the lock crate.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur while handling the sync lease.
#[derive(Error, Debug)]
pub enum LockError {
    /// The workspace has no repository metadata directory.
    #[error("not a repository: {}", .0.display())]
    NotARepository(PathBuf),

    /// Filesystem error on the lease or its directory.
    #[error("lock I/O error at {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The lease could not be serialized.
    #[error("lock encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl LockError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = LockError::NotARepository(PathBuf::from("/tmp/x"));
        assert_eq!(err.to_string(), "not a repository: /tmp/x");

        let err = LockError::io(
            "/tmp/x/.git/frontier-sync.lock",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("frontier-sync.lock"));
        assert!(err.to_string().contains("denied"));
    }
}
