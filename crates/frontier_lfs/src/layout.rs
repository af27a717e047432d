//! Side-directory layout for large-file bytes.
//!
//! ```text
//! <workspace>/.project/attachments/
//! ├─ pointers/   # tracked: pointer records, committed
//! ├─ files/      # untracked: real bytes, mirroring tracked relative paths
//! └─ corrupted/  # untracked: quarantined unrecoverable pointers
//! ```

use std::path::{Component, Path, PathBuf};

/// Where pointers, bytes and quarantined pointers live, relative to the
/// workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LargeFileLayout {
    /// Directory holding committed pointer files.
    pub pointers_dir: PathBuf,
    /// Directory holding real bytes. Never staged.
    pub files_dir: PathBuf,
    /// Quarantine for unrecoverable pointers. Never staged.
    pub corrupted_dir: PathBuf,
}

impl Default for LargeFileLayout {
    fn default() -> Self {
        let root = Path::new(".project").join("attachments");
        Self {
            pointers_dir: root.join("pointers"),
            files_dir: root.join("files"),
            corrupted_dir: root.join("corrupted"),
        }
    }
}

impl LargeFileLayout {
    /// Creates a layout rooted at `root` (relative to the workspace).
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            pointers_dir: root.join("pointers"),
            files_dir: root.join("files"),
            corrupted_dir: root.join("corrupted"),
        }
    }

    /// Relative location a tracked path mirrors to inside the side
    /// directories: the path below the pointers directory, or the whole
    /// path for tracked files elsewhere.
    pub fn mirror(&self, rel: &Path) -> PathBuf {
        rel.strip_prefix(&self.pointers_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| rel.to_path_buf())
    }

    /// Absolute path of the bytes for tracked path `rel`.
    pub fn files_path(&self, workdir: &Path, rel: &Path) -> PathBuf {
        workdir.join(&self.files_dir).join(self.mirror(rel))
    }

    /// Absolute quarantine path for tracked path `rel`.
    pub fn corrupted_path(&self, workdir: &Path, rel: &Path) -> PathBuf {
        workdir.join(&self.corrupted_dir).join(self.mirror(rel))
    }

    /// Returns true if `rel` lies in a directory that must never be staged.
    pub fn is_side_path(&self, rel: &Path) -> bool {
        rel.starts_with(&self.files_dir) || rel.starts_with(&self.corrupted_dir)
    }
}

/// Converts a repository path (always `/`-separated) into a relative path.
///
/// Returns `None` for paths that would escape the workspace.
pub fn repo_path(path: &str) -> Option<PathBuf> {
    let rel: PathBuf = path.split('/').filter(|s| !s.is_empty()).collect();
    let safe = rel
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    (safe && !rel.as_os_str().is_empty()).then_some(rel)
}

/// Converts a relative path into the `/`-separated form used for matching.
pub fn slash_path(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
