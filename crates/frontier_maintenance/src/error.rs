//! Error types for object store maintenance.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for maintenance operations.
pub type MaintenanceResult<T> = Result<T, MaintenanceError>;

/// Errors that can occur while maintaining the object store.
#[derive(Error, Debug)]
pub enum MaintenanceError {
    /// The repository could not be opened or read.
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

    /// The freshly written pack could not be located.
    #[error("written pack {expected} not found in {}", dir.display())]
    PackNotFound {
        /// Base name derived from the pack checksum.
        expected: String,
        /// Pack directory.
        dir: PathBuf,
    },
}

impl MaintenanceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
