//! Bringing committed pointers to local disk according to the media strategy.

use crate::error::LfsResult;
use crate::http::Credentials;
use crate::large_files::{workdir, write_new, LargeFiles, TransferFailure, TransferProgress};
use crate::layout::repo_path;
use crate::strategy::RepoStrategy;
use frontier_lfs_protocol::{
    BatchObjectResult, ObjectId, ObjectSpec, Operation, Pointer, PointerContent, MAX_POINTER_SIZE,
};
use git2::{ObjectType, Repository, TreeWalkMode, TreeWalkResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Strategy that was applied.
    pub strategy: RepoStrategy,
    /// Pointer placeholders written (stream-and-save).
    pub placeholders: Vec<PathBuf>,
    /// Files written with downloaded bytes (auto-download).
    pub downloaded: Vec<PathBuf>,
    /// Pointers whose files path was already occupied.
    pub skipped_existing: Vec<PathBuf>,
    /// Objects that could not be downloaded.
    pub failed: Vec<TransferFailure>,
    /// Files in the files directory that no committed pointer refers to.
    pub local_only: Vec<PathBuf>,
}

struct Missing {
    pointer: Pointer,
    paths: Vec<PathBuf>,
}

impl LargeFiles {
    /// Applies the workspace's media strategy to every committed pointer.
    ///
    /// Existing files are never overwritten, whatever their content.
    pub fn reconcile_pointers_filesystem(
        &self,
        repo: &Repository,
        auth: &Credentials,
    ) -> LfsResult<ReconcileReport> {
        self.reconcile_with_progress(repo, auth, &|_| {})
    }

    /// Like [`reconcile_pointers_filesystem`](Self::reconcile_pointers_filesystem),
    /// reporting download progress.
    pub fn reconcile_with_progress(
        &self,
        repo: &Repository,
        auth: &Credentials,
        on_progress: &dyn Fn(TransferProgress),
    ) -> LfsResult<ReconcileReport> {
        let workdir = workdir(repo)?.to_path_buf();
        let strategy = self.strategies().get(&workdir);
        let mut report = ReconcileReport {
            strategy,
            ..ReconcileReport::default()
        };
        if strategy == RepoStrategy::StreamOnly {
            debug!(workspace = %workdir.display(), "stream-only: nothing to reconcile");
            return Ok(report);
        }

        let layout = self.layout();
        let committed = self.committed_pointers(repo, &workdir)?;
        let mut missing: BTreeMap<ObjectId, Missing> = BTreeMap::new();

        for (rel, pointer) in &committed {
            let target = layout.files_path(&workdir, rel);
            if fs::symlink_metadata(&target).is_ok() {
                report.skipped_existing.push(rel.clone());
                continue;
            }
            match strategy {
                RepoStrategy::StreamAndSave => {
                    if write_new(&target, pointer.encode().as_bytes())? {
                        report.placeholders.push(rel.clone());
                    } else {
                        report.skipped_existing.push(rel.clone());
                    }
                }
                RepoStrategy::AutoDownload => {
                    missing
                        .entry(pointer.oid().clone())
                        .or_insert_with(|| Missing {
                            pointer: pointer.clone(),
                            paths: Vec::new(),
                        })
                        .paths
                        .push(rel.clone());
                }
                RepoStrategy::StreamOnly => {}
            }
        }

        if !missing.is_empty() {
            self.download_missing(repo, &workdir, missing, auth, &mut report, on_progress)?;
        }

        let mirrored: BTreeSet<PathBuf> = committed.keys().map(|rel| layout.mirror(rel)).collect();
        report.local_only = local_files(&workdir.join(&layout.files_dir))
            .into_iter()
            .filter(|rel| !mirrored.contains(rel))
            .collect();

        info!(
            strategy = %strategy,
            pointers = committed.len(),
            placeholders = report.placeholders.len(),
            downloaded = report.downloaded.len(),
            skipped = report.skipped_existing.len(),
            failed = report.failed.len(),
            local_only = report.local_only.len(),
            "reconciled large files"
        );
        Ok(report)
    }

    /// Valid pointers committed at HEAD under tracked paths.
    fn committed_pointers(
        &self,
        repo: &Repository,
        workdir: &Path,
    ) -> LfsResult<BTreeMap<PathBuf, Pointer>> {
        let tree = match repo.head() {
            Ok(head) => head.peel_to_tree()?,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        let tracked = self.tracked_paths(workdir)?;

        let mut candidates = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                let path = entry.name().and_then(|name| repo_path(&format!("{root}{name}")));
                if let Some(path) = path {
                    if tracked.is_tracked(&path) {
                        candidates.push((path, entry.id()));
                    }
                }
            }
            TreeWalkResult::Ok
        })?;

        let mut pointers = BTreeMap::new();
        for (path, id) in candidates {
            let blob = repo.find_blob(id)?;
            if blob.size() > MAX_POINTER_SIZE {
                continue;
            }
            match PointerContent::classify(blob.content()) {
                PointerContent::Pointer(pointer) => {
                    pointers.insert(path, pointer);
                }
                other => debug!(
                    path = %path.display(),
                    content = ?other,
                    "committed file is not a pointer"
                ),
            }
        }
        Ok(pointers)
    }

    fn download_missing(
        &self,
        repo: &Repository,
        workdir: &Path,
        missing: BTreeMap<ObjectId, Missing>,
        auth: &Credentials,
        report: &mut ReconcileReport,
        on_progress: &dyn Fn(TransferProgress),
    ) -> LfsResult<()> {
        let client = self.batch_client(repo)?;
        let specs = missing
            .values()
            .map(|m| ObjectSpec::from(&m.pointer))
            .collect();
        let results = client.batch(Operation::Download, specs, auth)?;
        let total = missing.len() as u64;
        let mut answered = BTreeSet::new();

        for (done, result) in results.into_iter().enumerate() {
            let oid = result.object().oid.clone();
            let Some(entry) = missing.get(&oid) else {
                warn!(oid = %oid, "server answered for an object that was not requested");
                continue;
            };
            answered.insert(oid);
            let outcome = match result {
                BatchObjectResult::Downloadable { action, .. } => client
                    .download(&action)
                    .map_err(|e| e.to_string())
                    .and_then(|bytes| {
                        if entry.pointer.matches(&bytes) {
                            Ok(bytes)
                        } else {
                            Err(format!(
                                "downloaded {} bytes that do not match the pointer",
                                bytes.len()
                            ))
                        }
                    }),
                BatchObjectResult::Errored { error, .. } => {
                    Err(format!("{} ({})", error.message, error.code))
                }
                BatchObjectResult::AlreadyPresent { .. } | BatchObjectResult::Uploadable { .. } => {
                    Err("server offered no download action".to_string())
                }
            };

            match outcome {
                Ok(bytes) => {
                    for rel in &entry.paths {
                        let target = self.layout().files_path(workdir, rel);
                        if write_new(&target, &bytes)? {
                            report.downloaded.push(rel.clone());
                        } else {
                            report.skipped_existing.push(rel.clone());
                        }
                    }
                }
                Err(message) => {
                    warn!(oid = %entry.pointer.oid(), error = %message, "download failed");
                    report.failed.push(TransferFailure {
                        oid: entry.pointer.oid().clone(),
                        paths: entry.paths.clone(),
                        message,
                    });
                }
            }
            on_progress(TransferProgress {
                completed: done as u64 + 1,
                total,
            });
        }

        for (oid, entry) in &missing {
            if !answered.contains(oid) {
                report.failed.push(TransferFailure {
                    oid: oid.clone(),
                    paths: entry.paths.clone(),
                    message: "object missing from batch response".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Files below `root`, relative to it. A missing directory has none.
fn local_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                if e.io_error().map(|io| io.kind()) != Some(std::io::ErrorKind::NotFound) {
                    warn!(error = %e, "could not list local large files");
                }
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect()
}
