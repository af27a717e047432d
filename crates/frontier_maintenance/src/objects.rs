//! Object database layout helpers.
//!
//! ```text
//! <gitdir>/objects/
//! ├─ ab/cdef...        # loose object, fan-out by first two hex chars
//! └─ pack/
//!    ├─ pack-<sha>.pack
//!    └─ pack-<sha>.idx
//! ```

use crate::error::{MaintenanceError, MaintenanceResult};
use git2::{Oid, Repository};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Returns the objects directory of `repo`, shared across worktrees.
pub fn objects_dir(repo: &Repository) -> PathBuf {
    repo.commondir().join("objects")
}

/// Returns the pack directory of `repo`.
pub fn pack_dir(repo: &Repository) -> PathBuf {
    objects_dir(repo).join("pack")
}

pub(crate) fn loose_object_path(objects: &Path, oid: Oid) -> PathBuf {
    let hex = oid.to_string();
    objects.join(&hex[..2]).join(&hex[2..])
}

fn is_fanout_dir(name: &str) -> bool {
    name.len() == 2 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

fn read_dir_or_empty(dir: &Path) -> MaintenanceResult<Vec<fs::DirEntry>> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .collect::<io::Result<Vec<_>>>()
            .map_err(|e| MaintenanceError::io(dir, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(MaintenanceError::io(dir, e)),
    }
}

/// Counts loose object files under `objects`.
pub fn count_loose_objects(objects: &Path) -> MaintenanceResult<usize> {
    let mut count = 0;
    for entry in read_dir_or_empty(objects)? {
        let name = entry.file_name();
        if !name.to_str().is_some_and(is_fanout_dir) {
            continue;
        }
        count += read_dir_or_empty(&entry.path())?
            .iter()
            .filter(|e| e.path().is_file())
            .count();
    }
    Ok(count)
}

/// Removes fan-out directories left empty after loose objects were deleted.
pub(crate) fn prune_empty_fanout(objects: &Path) -> MaintenanceResult<()> {
    for entry in read_dir_or_empty(objects)? {
        let name = entry.file_name();
        if !name.to_str().is_some_and(is_fanout_dir) {
            continue;
        }
        if read_dir_or_empty(&entry.path())?.is_empty() {
            // Another writer may have just added an object here.
            let _ = fs::remove_dir(entry.path());
        }
    }
    Ok(())
}

/// Lists base names (without extension) that have both a `.pack` and an `.idx`.
pub fn pack_pairs(pack_dir: &Path) -> MaintenanceResult<BTreeSet<String>> {
    let mut packs = BTreeSet::new();
    let mut indexes = BTreeSet::new();
    for entry in read_dir_or_empty(pack_dir)? {
        let path = entry.path();
        let (Some(stem), Some(ext)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|s| s.to_str()),
        ) else {
            continue;
        };
        match ext {
            "pack" => {
                packs.insert(stem.to_string());
            }
            "idx" => {
                indexes.insert(stem.to_string());
            }
            _ => {}
        }
    }
    Ok(packs.intersection(&indexes).cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loose_path_uses_fanout() {
        let oid = Oid::from_str("0123456789abcdef0123456789abcdef01234567").unwrap();
        let path = loose_object_path(Path::new("/o"), oid);
        assert_eq!(
            path,
            Path::new("/o/01/23456789abcdef0123456789abcdef01234567")
        );
    }

    #[test]
    fn counting_ignores_non_fanout_dirs() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("ab")).unwrap();
        fs::create_dir_all(dir.path().join("pack")).unwrap();
        fs::create_dir_all(dir.path().join("info")).unwrap();
        fs::write(dir.path().join("ab/cdef"), b"x").unwrap();
        fs::write(dir.path().join("ab/0123"), b"x").unwrap();
        fs::write(dir.path().join("pack/pack-1.pack"), b"x").unwrap();

        assert_eq!(count_loose_objects(dir.path()).unwrap(), 2);
        assert_eq!(count_loose_objects(&dir.path().join("missing")).unwrap(), 0);
    }

    #[test]
    fn pairs_require_both_files() {
        let dir = tempdir().unwrap();
        for name in ["pack-a.pack", "pack-a.idx", "pack-b.pack", "pack-c.idx", "pack-a.keep"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let pairs = pack_pairs(dir.path()).unwrap();
        assert_eq!(pairs.into_iter().collect::<Vec<_>>(), vec!["pack-a".to_string()]);
    }
}
