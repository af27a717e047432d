//! Consolidation of the object database into a single pack.

use crate::cleanup::cleanup_orphaned_packs;
use crate::error::{MaintenanceError, MaintenanceResult};
use crate::objects::{loose_object_path, objects_dir, pack_dir, pack_pairs, prune_empty_fanout};
use git2::{Buf, Oid, Repository};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Length of the SHA-1 trailer that names a pack.
const PACK_TRAILER_LEN: usize = 20;

/// Configuration for packing.
#[derive(Debug, Clone)]
pub struct PackConfig {
    /// Loose object count above which opportunistic packing runs.
    pub loose_threshold: usize,
    /// Whether to clean orphaned artifacts before packing.
    pub cleanup_first: bool,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            loose_threshold: 512,
            cleanup_first: true,
        }
    }
}

impl PackConfig {
    /// Sets the opportunistic packing threshold.
    #[must_use]
    pub fn with_loose_threshold(mut self, threshold: usize) -> Self {
        self.loose_threshold = threshold;
        self
    }
}

/// Result of a packing run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PackReport {
    /// Objects written into the new pack.
    pub objects_packed: usize,
    /// Loose objects deleted after packing.
    pub loose_removed: usize,
    /// Superseded pack pairs deleted.
    pub packs_removed: usize,
    /// Base name of the surviving pack, if any objects exist.
    pub pack_name: Option<String>,
    /// Orphaned artifacts removed before packing.
    pub orphans_removed: usize,
}

/// Packs the object database of one repository.
///
/// ## Example
///
/// ```ignore
/// use frontier_maintenance::{Packer, PackConfig};
///
/// let packer = Packer::new(PackConfig::default());
/// let report = packer.pack(Path::new("workspace"))?;
/// ```
pub struct Packer {
    config: PackConfig,
}

impl Packer {
    /// Creates a packer with the given configuration.
    #[must_use]
    pub fn new(config: PackConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    /// Returns true if the loose object count exceeds the threshold.
    pub fn should_pack(&self, dir: &Path) -> MaintenanceResult<bool> {
        let repo = Repository::open(dir)?;
        let loose = crate::objects::count_loose_objects(&objects_dir(&repo))?;
        Ok(loose > self.config.loose_threshold)
    }

    /// Writes every object into one new pack and removes what it supersedes.
    ///
    /// Objects are enumerated first; only those are packed, and only their
    /// loose copies are deleted. Objects created after enumeration stay
    /// loose. Previous packs are removed once the new pack is committed,
    /// since the enumeration covered their contents too.
    pub fn pack(&self, dir: &Path) -> MaintenanceResult<PackReport> {
        let repo = Repository::open(dir)?;
        let objects = objects_dir(&repo);
        let packs = pack_dir(&repo);
        let mut report = PackReport::default();

        if self.config.cleanup_first {
            report.orphans_removed = cleanup_orphaned_packs(&packs)?.removed();
        }

        let odb = repo.odb()?;
        let mut enumerated = BTreeSet::new();
        odb.foreach(|oid| {
            enumerated.insert(*oid);
            true
        })?;
        if enumerated.is_empty() {
            debug!(dir = %dir.display(), "object database is empty, nothing to pack");
            return Ok(report);
        }

        let previous = pack_pairs(&packs)?;

        let mut builder = repo.packbuilder()?;
        for oid in &enumerated {
            builder.insert_object(*oid, None)?;
        }
        let mut buf = Buf::new();
        builder.write_buf(&mut buf)?;
        let expected = pack_base_name(&buf);

        let mut writer = odb.packwriter()?;
        writer
            .write_all(&buf)
            .map_err(|e| MaintenanceError::io(&packs, e))?;
        writer.commit()?;
        drop(builder);

        let current = pack_pairs(&packs)?;
        let written = locate_written_pack(expected, &previous, &current, &packs)?;
        report.objects_packed = enumerated.len();

        for stale in previous.iter().filter(|name| **name != written) {
            for ext in ["pack", "idx", "rev", "bitmap"] {
                remove_if_present(&packs.join(format!("{stale}.{ext}")))?;
            }
            report.packs_removed += 1;
        }

        report.loose_removed = remove_loose(&objects, &enumerated)?;
        prune_empty_fanout(&objects)?;
        report.pack_name = Some(written);

        info!(
            dir = %dir.display(),
            objects = report.objects_packed,
            loose_removed = report.loose_removed,
            packs_removed = report.packs_removed,
            "packed object database"
        );
        Ok(report)
    }
}

/// Packs the repository at `dir` with default settings.
pub fn pack_objects(dir: &Path) -> MaintenanceResult<PackReport> {
    Packer::new(PackConfig::default()).pack(dir)
}

/// Derives the pack base name from its trailing checksum.
fn pack_base_name(buf: &[u8]) -> Option<String> {
    let trailer = buf.len().checked_sub(PACK_TRAILER_LEN).map(|at| &buf[at..])?;
    Some(format!("pack-{}", hex::encode(trailer)))
}

fn locate_written_pack(
    expected: Option<String>,
    previous: &BTreeSet<String>,
    current: &BTreeSet<String>,
    packs: &Path,
) -> MaintenanceResult<String> {
    if let Some(name) = expected.as_ref().filter(|name| current.contains(*name)) {
        return Ok(name.clone());
    }
    // Fall back to whatever appeared, if it is unambiguous.
    let mut fresh = current.difference(previous);
    match (fresh.next(), fresh.next()) {
        (Some(name), None) => Ok(name.clone()),
        _ => Err(MaintenanceError::PackNotFound {
            expected: expected.unwrap_or_default(),
            dir: packs.to_path_buf(),
        }),
    }
}

fn remove_loose(objects: &Path, enumerated: &BTreeSet<Oid>) -> MaintenanceResult<usize> {
    let mut removed = 0;
    for oid in enumerated {
        let path = loose_object_path(objects, *oid);
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                // Still safely stored in the pack; try again next run.
                warn!(path = %path.display(), error = %e, "could not remove loose object");
            }
        }
    }
    Ok(removed)
}

fn remove_if_present(path: &Path) -> MaintenanceResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MaintenanceError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::count_loose_objects;
    use git2::Signature;
    use tempfile::tempdir;

    fn commit_file(repo: &Repository, name: &str, content: &str) -> Oid {
        let workdir = repo.workdir().unwrap();
        fs::write(workdir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, name, &tree, &parents)
            .unwrap()
    }

    #[test]
    fn empty_repository_is_a_noop() {
        let dir = tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let report = pack_objects(dir.path()).unwrap();
        assert_eq!(report.objects_packed, 0);
        assert!(report.pack_name.is_none());
    }

    #[test]
    fn repeated_packing_leaves_one_pair() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        for i in 0..5 {
            commit_file(&repo, &format!("f{i}.txt"), &format!("content {i}"));
        }
        let objects = objects_dir(&repo);
        assert!(count_loose_objects(&objects).unwrap() > 0);

        let first = pack_objects(dir.path()).unwrap();
        assert_eq!(count_loose_objects(&objects).unwrap(), 0);
        let pairs = pack_pairs(&pack_dir(&repo)).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs.iter().next(), first.pack_name.as_ref());

        // History grows, then pack again.
        let head = commit_file(&repo, "later.txt", "more content");
        let second = pack_objects(dir.path()).unwrap();
        assert_eq!(second.packs_removed, 1);
        assert!(second.objects_packed > first.objects_packed);

        let pairs = pack_pairs(&pack_dir(&repo)).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs.iter().next(), second.pack_name.as_ref());
        let stray = fs::read_dir(pack_dir(&repo))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().into_string().unwrap();
                (name.ends_with(".pack") || name.ends_with(".idx"))
                    && !name.starts_with(second.pack_name.as_deref().unwrap())
            })
            .count();
        assert_eq!(stray, 0);

        // Everything is still readable from a fresh handle.
        let reopened = Repository::open(dir.path()).unwrap();
        let commit = reopened.find_commit(head).unwrap();
        assert_eq!(commit.parent_count(), 1);
        assert!(commit.tree().unwrap().get_name("f0.txt").is_some());
    }

    #[test]
    fn packing_cleans_orphans_first() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_file(&repo, "a.txt", "a");
        let packs = pack_dir(&repo);
        fs::create_dir_all(&packs).unwrap();
        fs::write(packs.join("tmp_pack_leftover"), b"junk").unwrap();
        fs::write(packs.join("pack-dead.idx"), b"junk").unwrap();

        let report = pack_objects(dir.path()).unwrap();
        assert_eq!(report.orphans_removed, 2);
        assert!(!packs.join("tmp_pack_leftover").exists());
    }

    #[test]
    fn threshold_check() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_file(&repo, "a.txt", "a");
        let eager = Packer::new(PackConfig::default().with_loose_threshold(0));
        assert!(eager.should_pack(dir.path()).unwrap());
        let lazy = Packer::new(PackConfig::default().with_loose_threshold(10_000));
        assert!(!lazy.should_pack(dir.path()).unwrap());
    }
}
