//! Removal of pack artifacts left by interrupted operations.

use crate::error::{MaintenanceError, MaintenanceResult};
use crate::objects::pack_pairs;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Reserved prefix of temporary files written during packing.
pub const TEMP_PREFIX: &str = "tmp_";

/// Prefix libgit2 uses for its in-progress pack files.
const LIBGIT2_TEMP_PREFIX: &str = "pack_git2_";

/// Files that only make sense next to a complete pack.
const PACK_COMPANIONS: &[&str] = &["rev", "bitmap", "mtimes"];

/// What a cleanup pass removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Temporary files removed.
    pub temp_files: Vec<PathBuf>,
    /// `.pack` or `.idx` files removed because their partner was missing.
    pub unpaired: Vec<PathBuf>,
}

impl CleanupReport {
    /// Total number of files removed.
    pub fn removed(&self) -> usize {
        self.temp_files.len() + self.unpaired.len()
    }
}

/// Removes orphaned artifacts from `pack_dir`.
///
/// A missing or empty directory is not an error.
pub fn cleanup_orphaned_packs(pack_dir: &Path) -> MaintenanceResult<CleanupReport> {
    let mut report = CleanupReport::default();
    let entries = match fs::read_dir(pack_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %pack_dir.display(), "no pack directory, nothing to clean");
            return Ok(report);
        }
        Err(e) => return Err(MaintenanceError::io(pack_dir, e)),
    };

    let complete = pack_pairs(pack_dir)?;

    for entry in entries {
        let entry = entry.map_err(|e| MaintenanceError::io(pack_dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if name.starts_with(TEMP_PREFIX) || name.starts_with(LIBGIT2_TEMP_PREFIX) {
            remove(&path)?;
            report.temp_files.push(path);
            continue;
        }

        let (Some(stem), Some(ext)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|s| s.to_str()),
        ) else {
            continue;
        };
        let is_pack_file = ext == "pack" || ext == "idx" || PACK_COMPANIONS.contains(&ext);
        if is_pack_file && !complete.contains(stem) {
            remove(&path)?;
            report.unpaired.push(path);
        }
    }

    if report.removed() > 0 {
        info!(
            dir = %pack_dir.display(),
            temp = report.temp_files.len(),
            unpaired = report.unpaired.len(),
            "removed orphaned pack artifacts"
        );
    }
    Ok(report)
}

fn remove(path: &Path) -> MaintenanceResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MaintenanceError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_and_empty_directories() {
        let dir = tempdir().unwrap();
        let report = cleanup_orphaned_packs(&dir.path().join("pack")).unwrap();
        assert_eq!(report.removed(), 0);

        let report = cleanup_orphaned_packs(dir.path()).unwrap();
        assert_eq!(report.removed(), 0);
    }

    #[test]
    fn removes_orphans_and_temp_files() {
        let dir = tempdir().unwrap();
        let files = [
            "pack-good.pack",
            "pack-good.idx",
            "pack-good.rev",
            "pack-nopair.pack",
            "pack-lonely.idx",
            "pack-lonely.rev",
            "tmp_pack_Xy12",
            "tmp_idx_Xy12",
            "pack_git2_abc123",
        ];
        for name in files {
            fs::write(dir.path().join(name), b"data").unwrap();
        }

        let report = cleanup_orphaned_packs(dir.path()).unwrap();
        assert_eq!(report.temp_files.len(), 3);
        assert_eq!(report.unpaired.len(), 3);

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        left.sort();
        assert_eq!(left, vec!["pack-good.idx", "pack-good.pack", "pack-good.rev"]);
    }
}
