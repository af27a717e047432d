//! Error types for the large-file subsystem.

use crate::http::TransportError;
use frontier_lfs_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for large-file operations.
pub type LfsResult<T> = Result<T, LfsError>;

/// Errors that abort a large-file operation.
///
/// Per-object failures are not errors; they are collected in reports.
#[derive(Error, Debug)]
pub enum LfsError {
    /// Malformed batch payload or pointer.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The request never got an HTTP answer.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server rejected the credentials (401).
    #[error("large-file server rejected the credentials; re-authenticate and retry")]
    AuthenticationFailed,

    /// The credentials lack permission (403).
    #[error("large-file store access denied; re-authenticate with an authorized account")]
    AccessDenied,

    /// Any other unexpected HTTP status.
    #[error("large-file server returned HTTP {status} for {url}")]
    Http {
        /// Status code.
        status: u16,
        /// Request URL.
        url: String,
    },

    /// No endpoint could be derived for the workspace.
    #[error("no large-file endpoint: {0}")]
    NoEndpoint(String),

    /// The repository has no working directory.
    #[error("repository has no working directory")]
    BareRepository,

    /// Repository access failed.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// Filesystem error.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The strategy store could not be read or written.
    #[error("strategy store error: {0}")]
    StrategyStore(String),

    /// An invalid tracked-path pattern.
    #[error("invalid tracked pattern {pattern:?}: {message}")]
    Pattern {
        /// The glob as written.
        pattern: String,
        /// Why it was rejected.
        message: String,
    },
}

impl LfsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Maps a non-success HTTP status to an error.
    pub fn from_status(status: u16, url: &str) -> Self {
        match status {
            401 => Self::AuthenticationFailed,
            403 => Self::AccessDenied,
            _ => Self::Http {
                status,
                url: url.to_string(),
            },
        }
    }

    /// Returns true if retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LfsError::Transport(_) => true,
            LfsError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            LfsError::from_status(401, "u"),
            LfsError::AuthenticationFailed
        ));
        assert!(matches!(LfsError::from_status(403, "u"), LfsError::AccessDenied));
        assert!(LfsError::from_status(503, "u").is_retryable());
        assert!(!LfsError::from_status(404, "u").is_retryable());
    }

    #[test]
    fn auth_errors_name_the_remedy() {
        assert!(LfsError::AuthenticationFailed.to_string().contains("re-authenticate"));
        assert!(LfsError::AccessDenied.to_string().contains("re-authenticate"));
    }

    #[test]
    fn transport_is_retryable() {
        let err: LfsError = TransportError::Timeout("slow".into()).into();
        assert!(err.is_retryable());
    }
}
