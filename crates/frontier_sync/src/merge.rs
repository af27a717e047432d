//! Two-way divergence analysis and merge commit construction.

use crate::error::{SyncError, SyncResult};
use crate::git::{changed_paths, commit_index, read_blob_at};
use crate::outcome::{Author, ConflictedFile, Resolution, ResolutionKind};
use frontier_lfs::slash_path;
use git2::{Index, IndexEntry, IndexTime, Oid, Repository};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Stage bits of an index entry's flags.
const STAGE_MASK: u16 = 0x3000;
const REGULAR_FILE: u32 = 0o100644;

/// How two diverged heads relate path by path.
#[derive(Debug, Clone, Default)]
pub struct Divergence {
    /// Common ancestor, if the histories share one.
    pub base: Option<Oid>,
    /// Paths changed only on the local side.
    pub local_only: BTreeSet<PathBuf>,
    /// Paths changed only on the remote side.
    pub remote_only: BTreeSet<PathBuf>,
    /// Paths changed on both sides to the same content.
    pub converged: BTreeSet<PathBuf>,
    /// Paths changed on both sides to different content.
    pub conflicts: Vec<ConflictedFile>,
}

/// Compares `local` and `remote` against their merge base.
pub fn analyze(repo: &Repository, local: Oid, remote: Oid) -> SyncResult<Divergence> {
    let base = match repo.merge_base(local, remote) {
        Ok(base) => Some(base),
        Err(e) if e.code() == git2::ErrorCode::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    let local_changed = changed_paths(repo, base, local)?;
    let remote_changed = changed_paths(repo, base, remote)?;

    let mut divergence = Divergence {
        base,
        local_only: local_changed.difference(&remote_changed).cloned().collect(),
        remote_only: remote_changed.difference(&local_changed).cloned().collect(),
        ..Divergence::default()
    };

    for path in local_changed.intersection(&remote_changed) {
        let ours = read_blob_at(repo, local, path);
        let theirs = read_blob_at(repo, remote, path);
        if ours == theirs {
            divergence.converged.insert(path.clone());
            continue;
        }
        let base_content = base
            .map(|base| read_blob_at(repo, base, path))
            .unwrap_or_default();
        divergence.conflicts.push(ConflictedFile {
            filepath: path.clone(),
            ours,
            theirs,
            base: base_content,
        });
    }

    debug!(
        local_only = divergence.local_only.len(),
        remote_only = divergence.remote_only.len(),
        converged = divergence.converged.len(),
        conflicts = divergence.conflicts.len(),
        "analyzed divergence"
    );
    Ok(divergence)
}

/// Creates a commit with parents `ours` and `theirs` from a three-way merge
/// of the two trees. The branch ref is not moved.
///
/// Conflicted paths keep the local version unless a resolution names them.
/// `Created` and `Modified` resolutions take the working-tree bytes;
/// `Deleted` resolutions drop the path from the tree and the working tree.
pub fn merge_heads(
    repo: &Repository,
    ours: Oid,
    theirs: Oid,
    resolutions: &[Resolution],
    author: &Author,
    message: &str,
) -> SyncResult<Oid> {
    let our_commit = repo.find_commit(ours)?;
    let their_commit = repo.find_commit(theirs)?;
    let mut index = repo.merge_commits(&our_commit, &their_commit, None)?;

    if index.has_conflicts() {
        keep_ours(&mut index)?;
    }
    apply_resolutions(repo, &mut index, resolutions)?;

    let parents: &[Oid] = if ours == theirs { &[ours] } else { &[ours, theirs] };
    commit_index(repo, &mut index, author, message, parents)
}

fn keep_ours(index: &mut Index) -> SyncResult<()> {
    let conflicts = index.conflicts()?.collect::<Result<Vec<_>, _>>()?;
    for conflict in conflicts {
        let Some(path) = [&conflict.our, &conflict.their, &conflict.ancestor]
            .into_iter()
            .flatten()
            .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
            .next()
        else {
            continue;
        };
        index.conflict_remove(Path::new(&path))?;
        if let Some(mut our) = conflict.our {
            our.flags &= !STAGE_MASK;
            index.add(&our)?;
        }
        debug!(path = %path, "conflict kept local version");
    }
    Ok(())
}

fn apply_resolutions(
    repo: &Repository,
    index: &mut Index,
    resolutions: &[Resolution],
) -> SyncResult<()> {
    if resolutions.is_empty() {
        return Ok(());
    }
    let workdir = repo
        .workdir()
        .ok_or_else(|| SyncError::PreconditionFailure("repository has no working tree".into()))?;

    for resolution in resolutions {
        let rel = &resolution.filepath;
        let full = workdir.join(rel);
        match resolution.resolution {
            ResolutionKind::Created | ResolutionKind::Modified => {
                let bytes = fs::read(&full).map_err(|e| SyncError::io(&full, e))?;
                let mode = index
                    .get_path(rel, 0)
                    .map(|entry| entry.mode)
                    .unwrap_or(REGULAR_FILE);
                index.add(&IndexEntry {
                    ctime: IndexTime::new(0, 0),
                    mtime: IndexTime::new(0, 0),
                    dev: 0,
                    ino: 0,
                    mode,
                    uid: 0,
                    gid: 0,
                    file_size: u32::try_from(bytes.len()).unwrap_or(u32::MAX),
                    id: repo.blob(&bytes)?,
                    flags: 0,
                    flags_extended: 0,
                    path: slash_path(rel).into_bytes(),
                })?;
            }
            ResolutionKind::Deleted => {
                index.remove_path(rel)?;
                match fs::remove_file(&full) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => {
                        warn!(path = %full.display(), error = %e, "could not remove resolved file")
                    }
                }
            }
        }
        debug!(path = %rel.display(), resolution = ?resolution.resolution, "applied resolution");
    }
    Ok(())
}

/// Commit message naming the resolved paths.
pub fn merge_message(resolutions: &[Resolution]) -> String {
    if resolutions.is_empty() {
        return "Merge remote changes".to_string();
    }
    let paths: Vec<String> = resolutions.iter().map(|r| slash_path(&r.filepath)).collect();
    format!("Merge remote changes; resolved {}", paths.join(", "))
}
