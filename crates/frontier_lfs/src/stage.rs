//! Staging with large-file substitution.
//!
//! A staging pass runs in four steps:
//! 1. classify every new or modified tracked file (pointer, raw, corrupted)
//! 2. negotiate one upload batch and PUT the objects the server asks for
//! 3. move raw bytes to the files directory and write pointers in their place
//! 4. stage every change, including the rewritten pointers
//!
//! A failed batch negotiation aborts before step 3, so no file is rewritten
//! without knowing the transfer outcome. Per-object upload failures are
//! collected in the report.

use crate::client::BatchClient;
use crate::error::{LfsError, LfsResult};
use crate::http::Credentials;
use crate::large_files::{
    create_parent, hash_file, holds_content, read_head, replace_with_copy, workdir, LargeFiles,
    TransferFailure, TransferProgress,
};
use crate::layout::{repo_path, LargeFileLayout};
use frontier_lfs_protocol::{
    BatchObjectResult, ObjectId, ObjectSpec, Operation, Pointer, PointerContent,
};
use git2::{Repository, Status, StatusOptions};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How a path differs from the last commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Not in the last commit.
    Added,
    /// Content or mode changed.
    Modified,
    /// Gone from the working tree.
    Deleted,
}

/// A changed path in the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeChange {
    /// Workspace-relative path.
    pub path: PathBuf,
    /// Kind of change.
    pub kind: ChangeKind,
}

/// Lists every path that differs between the last commit, the index and
/// the working tree. Side directories are never reported.
pub fn worktree_changes(
    repo: &Repository,
    layout: &LargeFileLayout,
) -> LfsResult<Vec<WorktreeChange>> {
    let workdir = workdir(repo)?;
    let mut options = StatusOptions::new();
    options
        .include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false)
        .exclude_submodules(true);

    let statuses = repo.statuses(Some(&mut options))?;
    let mut changes = Vec::new();
    for entry in statuses.iter() {
        let status = entry.status();
        if status.is_empty() || status.contains(Status::IGNORED) {
            continue;
        }
        let Some(path) = entry.path().and_then(repo_path) else {
            continue;
        };
        if layout.is_side_path(&path) {
            continue;
        }
        let kind = if fs::symlink_metadata(workdir.join(&path)).is_err() {
            ChangeKind::Deleted
        } else if status.contains(Status::INDEX_NEW)
            || (status.contains(Status::WT_NEW) && !status.contains(Status::INDEX_DELETED))
        {
            ChangeKind::Added
        } else {
            ChangeKind::Modified
        };
        changes.push(WorktreeChange { path, kind });
    }
    Ok(changes)
}

/// An unrecoverable pointer moved out of the tracked tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quarantined {
    /// Where the pointer was.
    pub path: PathBuf,
    /// Where it is now.
    pub quarantined_to: PathBuf,
}

/// Outcome of a staging pass.
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    /// Staged new paths.
    pub added: Vec<PathBuf>,
    /// Staged modified paths.
    pub modified: Vec<PathBuf>,
    /// Paths removed from the index.
    pub deleted: Vec<PathBuf>,
    /// Tracked files replaced by a pointer in this pass.
    pub pointers_written: Vec<PathBuf>,
    /// Empty or malformed pointers rebuilt from local bytes.
    pub recovered: Vec<PathBuf>,
    /// Unrecoverable pointers moved to quarantine.
    pub quarantined: Vec<Quarantined>,
    /// Objects uploaded.
    pub uploaded: usize,
    /// Objects the server already had.
    pub already_present: usize,
    /// Objects that could not be uploaded.
    pub failed_uploads: Vec<TransferFailure>,
}

impl StageReport {
    /// Returns true if anything was staged.
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty())
    }
}

struct PendingUpload {
    pointer: Pointer,
    source: PathBuf,
    paths: Vec<PathBuf>,
}

struct Rewrite {
    path: PathBuf,
    pointer: Pointer,
    move_bytes: bool,
}

#[derive(Default)]
struct Plan {
    uploads: BTreeMap<ObjectId, PendingUpload>,
    rewrites: Vec<Rewrite>,
}

impl Plan {
    fn offer(&mut self, pointer: &Pointer, source: PathBuf, path: &Path) {
        self.uploads
            .entry(pointer.oid().clone())
            .or_insert_with(|| PendingUpload {
                pointer: pointer.clone(),
                source,
                paths: Vec::new(),
            })
            .paths
            .push(path.to_path_buf());
    }
}

enum Recovery {
    Bytes(Pointer),
    Placeholder(Pointer),
}

impl LargeFiles {
    /// Stages every change in the working tree, replacing tracked large
    /// files with pointers and uploading their bytes.
    pub fn stage_all_with_large_file_support(
        &self,
        repo: &Repository,
        auth: &Credentials,
    ) -> LfsResult<StageReport> {
        self.stage_all_with_progress(repo, auth, &|_| {})
    }

    /// Like [`stage_all_with_large_file_support`](Self::stage_all_with_large_file_support),
    /// reporting upload progress.
    pub fn stage_all_with_progress(
        &self,
        repo: &Repository,
        auth: &Credentials,
        on_progress: &dyn Fn(TransferProgress),
    ) -> LfsResult<StageReport> {
        self.stage(repo, Some((auth, on_progress)))
    }

    /// Stages every change without contacting the server.
    ///
    /// Raw bytes still become pointers. Their upload is deferred to
    /// [`upload_committed`](Self::upload_committed) before the next push.
    pub fn stage_all_offline(&self, repo: &Repository) -> LfsResult<StageReport> {
        self.stage(repo, None)
    }

    fn stage(
        &self,
        repo: &Repository,
        upload: Option<(&Credentials, &dyn Fn(TransferProgress))>,
    ) -> LfsResult<StageReport> {
        let workdir = workdir(repo)?.to_path_buf();
        let layout = self.layout();
        let tracked = self.tracked_paths(&workdir)?;
        let mut report = StageReport::default();
        let mut plan = Plan::default();

        for change in worktree_changes(repo, layout)? {
            if change.kind != ChangeKind::Deleted && tracked.is_tracked(&change.path) {
                self.plan_tracked(&workdir, &change.path, &mut plan, &mut report)?;
            }
        }

        match upload {
            Some((auth, on_progress)) if !plan.uploads.is_empty() => {
                let client = self.batch_client(repo)?;
                upload_all(&client, &plan.uploads, auth, &mut report, on_progress)?;
            }
            Some(_) => {}
            None => debug!(deferred = plan.uploads.len(), "offline: uploads deferred"),
        }

        apply_rewrites(&workdir, layout, &plan.rewrites, &mut report)?;

        let mut index = repo.index()?;
        for change in worktree_changes(repo, layout)? {
            match change.kind {
                ChangeKind::Deleted => {
                    index.remove_path(&change.path)?;
                    report.deleted.push(change.path);
                }
                ChangeKind::Added => {
                    index.add_path(&change.path)?;
                    report.added.push(change.path);
                }
                ChangeKind::Modified => {
                    index.add_path(&change.path)?;
                    report.modified.push(change.path);
                }
            }
        }
        index.write()?;

        info!(
            added = report.added.len(),
            modified = report.modified.len(),
            deleted = report.deleted.len(),
            pointers = report.pointers_written.len(),
            quarantined = report.quarantined.len(),
            failed_uploads = report.failed_uploads.len(),
            "staged working tree"
        );
        Ok(report)
    }

    /// Prepares specific tracked paths for staging: raw bytes become
    /// pointers, corrupted pointers are recovered or quarantined. Nothing
    /// is uploaded; the next staging pass re-offers the bytes.
    pub fn prepare_paths(&self, repo: &Repository, paths: &[PathBuf]) -> LfsResult<StageReport> {
        let workdir = workdir(repo)?.to_path_buf();
        let tracked = self.tracked_paths(&workdir)?;
        let mut report = StageReport::default();
        let mut plan = Plan::default();
        for path in paths {
            if tracked.is_tracked(path) && workdir.join(path).is_file() {
                self.plan_tracked(&workdir, path, &mut plan, &mut report)?;
            }
        }
        apply_rewrites(&workdir, self.layout(), &plan.rewrites, &mut report)?;
        Ok(report)
    }

    /// Uploads the bytes behind pointers at `paths` before they are pushed.
    ///
    /// Covers pointers committed while offline. Only pointers whose bytes
    /// are present locally are offered; the server skips what it has.
    pub fn upload_committed(
        &self,
        repo: &Repository,
        paths: &[PathBuf],
        auth: &Credentials,
        on_progress: &dyn Fn(TransferProgress),
    ) -> LfsResult<StageReport> {
        let workdir = workdir(repo)?.to_path_buf();
        let tracked = self.tracked_paths(&workdir)?;
        let mut report = StageReport::default();
        let mut plan = Plan::default();
        for rel in paths.iter().filter(|rel| tracked.is_tracked(rel)) {
            let target = workdir.join(rel);
            if !target.is_file() {
                continue;
            }
            let content = PointerContent::classify(&read_head(&target)?);
            if let PointerContent::Pointer(pointer) = content {
                let bytes = self.layout().files_path(&workdir, rel);
                if holds_content(&bytes, &pointer)? {
                    plan.offer(&pointer, bytes, rel);
                }
            }
        }
        if !plan.uploads.is_empty() {
            let client = self.batch_client(repo)?;
            upload_all(&client, &plan.uploads, auth, &mut report, on_progress)?;
            info!(
                uploaded = report.uploaded,
                already_present = report.already_present,
                failed = report.failed_uploads.len(),
                "uploaded committed large files"
            );
        }
        Ok(report)
    }

    fn plan_tracked(
        &self,
        workdir: &Path,
        rel: &Path,
        plan: &mut Plan,
        report: &mut StageReport,
    ) -> LfsResult<()> {
        let layout = self.layout();
        let target = workdir.join(rel);
        if !target.is_file() {
            return Ok(());
        }

        match PointerContent::classify(&read_head(&target)?) {
            PointerContent::Pointer(pointer) => {
                let bytes = layout.files_path(workdir, rel);
                if holds_content(&bytes, &pointer)? {
                    plan.offer(&pointer, bytes, rel);
                }
            }
            PointerContent::Raw => {
                let pointer = hash_file(&target)?;
                debug!(
                    path = %rel.display(),
                    oid = %pointer.oid(),
                    size = pointer.size(),
                    "raw large file"
                );
                plan.offer(&pointer, target, rel);
                plan.rewrites.push(Rewrite {
                    path: rel.to_path_buf(),
                    pointer,
                    move_bytes: true,
                });
            }
            corrupted => {
                let bytes = layout.files_path(workdir, rel);
                match recover(&bytes)? {
                    Some(recovery) => {
                        let pointer = match recovery {
                            Recovery::Bytes(pointer) => {
                                plan.offer(&pointer, bytes, rel);
                                pointer
                            }
                            Recovery::Placeholder(pointer) => pointer,
                        };
                        info!(
                            path = %rel.display(),
                            oid = %pointer.oid(),
                            "recovered corrupted pointer"
                        );
                        plan.rewrites.push(Rewrite {
                            path: rel.to_path_buf(),
                            pointer,
                            move_bytes: false,
                        });
                        report.recovered.push(rel.to_path_buf());
                    }
                    None => {
                        let destination = layout.corrupted_path(workdir, rel);
                        match quarantine(&target, &destination) {
                            Ok(()) => {
                                warn!(
                                    path = %rel.display(),
                                    quarantined_to = %destination.display(),
                                    problem = ?corrupted,
                                    "quarantined unrecoverable pointer"
                                );
                                report.quarantined.push(Quarantined {
                                    path: rel.to_path_buf(),
                                    quarantined_to: destination,
                                });
                            }
                            Err(e) => {
                                warn!(
                                    path = %rel.display(),
                                    error = %e,
                                    "could not quarantine corrupted pointer"
                                );
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Moves raw bytes aside and writes each pointer in place.
fn apply_rewrites(
    workdir: &Path,
    layout: &LargeFileLayout,
    rewrites: &[Rewrite],
    report: &mut StageReport,
) -> LfsResult<()> {
    for rewrite in rewrites {
        let target = workdir.join(&rewrite.path);
        if rewrite.move_bytes {
            replace_with_copy(&target, &layout.files_path(workdir, &rewrite.path))?;
        }
        fs::write(&target, rewrite.pointer.encode()).map_err(|e| LfsError::io(&target, e))?;
        report.pointers_written.push(rewrite.path.clone());
    }
    Ok(())
}

/// Looks for usable content at the mirrored files path.
fn recover(bytes: &Path) -> LfsResult<Option<Recovery>> {
    if !bytes.is_file() {
        return Ok(None);
    }
    match PointerContent::classify(&read_head(bytes)?) {
        PointerContent::Empty | PointerContent::Malformed(_) => Ok(None),
        // A placeholder left by stream-and-save still names the right object.
        PointerContent::Pointer(pointer) => Ok(Some(Recovery::Placeholder(pointer))),
        PointerContent::Raw => Ok(Some(Recovery::Bytes(hash_file(bytes)?))),
    }
}

fn quarantine(from: &Path, to: &Path) -> LfsResult<()> {
    create_parent(to)?;
    fs::rename(from, to).map_err(|e| LfsError::io(from, e))
}

fn upload_all(
    client: &BatchClient,
    uploads: &BTreeMap<ObjectId, PendingUpload>,
    auth: &Credentials,
    report: &mut StageReport,
    on_progress: &dyn Fn(TransferProgress),
) -> LfsResult<()> {
    let specs = uploads
        .values()
        .map(|pending| ObjectSpec::from(&pending.pointer))
        .collect();
    let results = client.batch(Operation::Upload, specs, auth)?;
    let total = results.len() as u64;

    for (done, result) in results.into_iter().enumerate() {
        let Some(pending) = uploads.get(&result.object().oid) else {
            warn!(oid = %result.object().oid, "server answered for an object that was not offered");
            continue;
        };
        let failure = |message: String| TransferFailure {
            oid: pending.pointer.oid().clone(),
            paths: pending.paths.clone(),
            message,
        };
        match result {
            BatchObjectResult::Uploadable { action, .. } => {
                let sent = fs::read(&pending.source)
                    .map_err(|e| LfsError::io(&pending.source, e))
                    .and_then(|bytes| client.upload(&action, bytes));
                match sent {
                    Ok(()) => {
                        debug!(oid = %pending.pointer.oid(), "uploaded");
                        report.uploaded += 1;
                    }
                    Err(e) => {
                        warn!(oid = %pending.pointer.oid(), error = %e, "upload failed");
                        report.failed_uploads.push(failure(e.to_string()));
                    }
                }
            }
            BatchObjectResult::AlreadyPresent { .. } => report.already_present += 1,
            BatchObjectResult::Errored { error, .. } => {
                warn!(
                    oid = %pending.pointer.oid(),
                    code = error.code,
                    message = %error.message,
                    "server refused upload"
                );
                report
                    .failed_uploads
                    .push(failure(format!("{} ({})", error.message, error.code)));
            }
            BatchObjectResult::Downloadable { .. } => {
                report
                    .failed_uploads
                    .push(failure("server offered a download for an upload".to_string()));
            }
        }
        on_progress(TransferProgress {
            completed: done as u64 + 1,
            total,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LfsConfig;
    use crate::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, TransportError};
    use crate::strategy::StrategyStore;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    const POINTERS: &str = ".project/attachments/pointers";

    /// Answers every batch with upload actions and accepts every PUT.
    #[derive(Default)]
    struct AcceptAll {
        seen: Mutex<Vec<HttpRequest>>,
        fail_batch: bool,
    }

    impl HttpClient for AcceptAll {
        fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().push(request.clone());
            if request.method == HttpMethod::Put {
                return Ok(HttpResponse::new(200, Vec::new()));
            }
            if self.fail_batch {
                return Err(TransportError::Timeout("batch".into()));
            }
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let objects: Vec<serde_json::Value> = body["objects"]
                .as_array()
                .unwrap()
                .iter()
                .map(|o| {
                    serde_json::json!({
                        "oid": o["oid"],
                        "size": o["size"],
                        "actions": {"upload": {"href": format!("https://store/{}", o["oid"].as_str().unwrap())}}
                    })
                })
                .collect();
            let response = serde_json::json!({ "objects": objects });
            Ok(HttpResponse::new(200, serde_json::to_vec(&response).unwrap()))
        }
    }

    fn setup(http: Arc<AcceptAll>) -> (TempDir, Repository, LargeFiles) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let files = LargeFiles::new(
            LfsConfig::default().with_endpoint("https://lfs.test/batch"),
            http,
            Arc::new(StrategyStore::in_memory()),
        );
        (dir, repo, files)
    }

    fn write(dir: &Path, rel: &str, bytes: &[u8]) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn creds() -> Credentials {
        Credentials::new("u", "p")
    }

    #[test]
    fn raw_file_becomes_pointer_and_is_uploaded() {
        let http = Arc::new(AcceptAll::default());
        let (dir, repo, files) = setup(http.clone());
        let rel = format!("{POINTERS}/img/cat.png");
        write(dir.path(), &rel, b"\x89PNG real bytes");
        write(dir.path(), "notes.txt", b"hello");

        let report = files.stage_all_with_large_file_support(&repo, &creds()).unwrap();

        let expected = Pointer::from_content(b"\x89PNG real bytes");
        assert_eq!(fs::read_to_string(dir.path().join(&rel)).unwrap(), expected.encode());
        assert_eq!(
            fs::read(dir.path().join(".project/attachments/files/img/cat.png")).unwrap(),
            b"\x89PNG real bytes"
        );
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.pointers_written, vec![PathBuf::from(&rel)]);
        assert_eq!(report.added.len(), 2);

        let index = repo.index().unwrap();
        assert!(index.get_path(Path::new(&rel), 0).is_some());
        assert!(index
            .get_path(Path::new(".project/attachments/files/img/cat.png"), 0)
            .is_none());

        let seen = http.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].url, format!("https://store/{}", expected.oid()));
        assert!(seen[1].basic_auth.is_none());
    }

    #[test]
    fn empty_pointer_without_bytes_is_quarantined() {
        let (dir, repo, files) = setup(Arc::new(AcceptAll::default()));
        let rel = format!("{POINTERS}/docs/broken.pdf");
        write(dir.path(), &rel, b"");

        let report = files.stage_all_with_large_file_support(&repo, &creds()).unwrap();

        assert!(!dir.path().join(&rel).exists());
        assert!(dir
            .path()
            .join(".project/attachments/corrupted/docs/broken.pdf")
            .exists());
        assert_eq!(report.quarantined.len(), 1);
        assert!(report.added.is_empty());
    }

    #[test]
    fn empty_pointer_recovered_from_local_bytes() {
        let (dir, repo, files) = setup(Arc::new(AcceptAll::default()));
        let rel = format!("{POINTERS}/clip.mp4");
        write(dir.path(), &rel, b"");
        write(dir.path(), ".project/attachments/files/clip.mp4", b"movie bytes");

        let report = files.stage_all_with_large_file_support(&repo, &creds()).unwrap();

        let decoded = Pointer::decode(&fs::read(dir.path().join(&rel)).unwrap()).unwrap();
        assert!(decoded.matches(b"movie bytes"));
        assert_eq!(report.recovered, vec![PathBuf::from(&rel)]);
        assert_eq!(report.uploaded, 1);
    }

    #[test]
    fn malformed_pointer_recovered_from_placeholder() {
        let (dir, repo, files) = setup(Arc::new(AcceptAll::default()));
        let rel = format!("{POINTERS}/a.bin");
        let pointer = Pointer::from_content(b"remote only");
        write(dir.path(), &rel, b"version https://git-lfs.github.com/spec/v1\noid sha");
        write(
            dir.path(),
            ".project/attachments/files/a.bin",
            pointer.encode().as_bytes(),
        );

        let report = files.stage_all_with_large_file_support(&repo, &creds()).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join(&rel)).unwrap(), pointer.encode());
        assert_eq!(report.recovered.len(), 1);
        assert_eq!(report.uploaded, 0);
    }

    #[test]
    fn batch_failure_rewrites_nothing() {
        let http = Arc::new(AcceptAll {
            fail_batch: true,
            ..AcceptAll::default()
        });
        let (dir, repo, files) = setup(http);
        let rel = format!("{POINTERS}/big.bin");
        write(dir.path(), &rel, b"raw content");

        let err = files
            .stage_all_with_large_file_support(&repo, &creds())
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(fs::read(dir.path().join(&rel)).unwrap(), b"raw content");
        assert!(!dir.path().join(".project/attachments/files/big.bin").exists());
    }

    #[test]
    fn untracked_files_are_staged_without_network() {
        let http = Arc::new(AcceptAll::default());
        let (dir, repo, files) = setup(http.clone());
        write(dir.path(), "src/main.rs", b"fn main() {}");

        let report = files.stage_all_with_large_file_support(&repo, &creds()).unwrap();
        assert_eq!(report.added, vec![PathBuf::from("src/main.rs")]);
        assert!(http.seen.lock().is_empty());
    }

    #[test]
    fn offline_staging_writes_pointer_and_defers_upload() {
        let http = Arc::new(AcceptAll::default());
        let (dir, repo, files) = setup(http.clone());
        let rel = format!("{POINTERS}/doc.pdf");
        write(dir.path(), &rel, b"%PDF offline");

        let report = files.stage_all_offline(&repo).unwrap();
        assert!(http.seen.lock().is_empty());
        assert_eq!(report.pointers_written, vec![PathBuf::from(&rel)]);
        assert_eq!(report.uploaded, 0);
        assert_eq!(
            fs::read(dir.path().join(".project/attachments/files/doc.pdf")).unwrap(),
            b"%PDF offline"
        );

        let pushed = files
            .upload_committed(&repo, &[PathBuf::from(&rel)], &creds(), &|_| {})
            .unwrap();
        assert_eq!(pushed.uploaded, 1);
        let seen = http.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].method, HttpMethod::Put);
    }

    #[test]
    fn changes_skip_side_directories() {
        let (dir, repo, files) = setup(Arc::new(AcceptAll::default()));
        write(dir.path(), ".project/attachments/files/x.bin", b"bytes");
        write(dir.path(), ".project/attachments/corrupted/y.bin", b"");
        write(dir.path(), "a.txt", b"a");

        let changes = worktree_changes(&repo, files.layout()).unwrap();
        assert_eq!(
            changes,
            vec![WorktreeChange {
                path: PathBuf::from("a.txt"),
                kind: ChangeKind::Added
            }]
        );
    }
}
