//! Values exchanged with the caller of a sync.

use frontier_lfs::{ReconcileReport, StageReport};
use git2::{Oid, Signature};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Name and email recorded on commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

impl Author {
    /// Creates an author identity.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    pub(crate) fn signature(&self) -> Result<Signature<'static>, git2::Error> {
        Signature::now(&self.name, &self.email)
    }
}

/// One path both sides changed to different content.
///
/// Contents are raw bytes. A side that deleted the path has empty content.
/// `base` is empty when no common ancestor version could be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictedFile {
    /// Workspace-relative path.
    pub filepath: PathBuf,
    /// Local content.
    pub ours: Vec<u8>,
    /// Remote content.
    pub theirs: Vec<u8>,
    /// Common ancestor content.
    pub base: Vec<u8>,
}

/// How the caller resolved a conflicted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionKind {
    /// The working-tree file holds the resolved content.
    Modified,
    /// The working-tree file is new and holds the resolved content.
    Created,
    /// The path is removed.
    Deleted,
}

/// A caller-supplied resolution for one conflicted path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Workspace-relative path.
    pub filepath: PathBuf,
    /// What to do with it.
    pub resolution: ResolutionKind,
}

impl Resolution {
    /// Creates a resolution.
    pub fn new(filepath: impl Into<PathBuf>, resolution: ResolutionKind) -> Self {
        Self {
            filepath: filepath.into(),
            resolution,
        }
    }
}

/// Outcome of one `sync_changes` call.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// True if conflicts were found and nothing was pushed.
    pub had_conflicts: bool,
    /// The conflicts, for the caller to resolve.
    pub conflicts: Vec<ConflictedFile>,
    /// True if another sync held the lease and nothing was done.
    pub skipped_due_to_lock: bool,
    /// True if the remote was unreachable and network steps were skipped.
    pub offline: bool,
    /// Local commit created from working-tree changes.
    pub committed: Option<Oid>,
    /// Merge commit created for diverged histories.
    pub merged: Option<Oid>,
    /// True if the local branch was moved to the remote commit.
    pub fast_forwarded: bool,
    /// True if anything was pushed.
    pub pushed: bool,
    /// Non-fatal problems worth showing the user.
    pub warnings: Vec<String>,
    /// Staging details, if the working tree was dirty.
    pub stage: Option<StageReport>,
    /// Large-file rehydration details, if the working tree moved.
    pub reconcile: Option<ReconcileReport>,
}

impl SyncOutcome {
    pub(crate) fn skipped() -> Self {
        Self {
            skipped_due_to_lock: true,
            ..Self::default()
        }
    }
}

/// Outcome of one `complete_merge` call.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Commit the branch points at after the merge.
    pub commit: Oid,
    /// True if a forcing push was needed.
    pub forced: bool,
    /// Non-fatal problems, including possibly overwritten remote changes.
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolutions_parse_from_json() {
        let parsed: Vec<Resolution> = serde_json::from_str(
            r#"[{"filepath":"a.txt","resolution":"modified"},{"filepath":"b/c.txt","resolution":"deleted"}]"#,
        )
        .unwrap();
        assert_eq!(parsed[0], Resolution::new("a.txt", ResolutionKind::Modified));
        assert_eq!(parsed[1].resolution, ResolutionKind::Deleted);
    }

    #[test]
    fn skipped_outcome() {
        let outcome = SyncOutcome::skipped();
        assert!(outcome.skipped_due_to_lock);
        assert!(!outcome.had_conflicts);
        assert!(!outcome.pushed);
    }
}
