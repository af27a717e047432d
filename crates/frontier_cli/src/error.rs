//! Errors raised by the command layer itself.

use std::path::PathBuf;
use thiserror::Error;

/// Failures that do not come from a library crate.
#[derive(Error, Debug)]
pub enum CliError {
    /// The `--resolutions` argument is not a resolution list.
    #[error("invalid resolutions: {0}")]
    InvalidResolutions(#[from] serde_json::Error),

    /// A resolution names a path outside the workspace.
    #[error("resolution path {0:?} is not a workspace-relative path")]
    InvalidPath(String),

    /// The sync lock is held by a live process.
    #[error("sync lock of {workspace} is {state} (pid {pid}); pass --force to remove it anyway")]
    LockHeld {
        /// Workspace path.
        workspace: PathBuf,
        /// Observed state.
        state: String,
        /// Holder pid, or "unknown".
        pid: String,
    },

    /// The sync ended with unresolved conflicts.
    #[error("{0} conflicted file(s); resolve them and run complete-merge")]
    Conflicts(usize),
}
