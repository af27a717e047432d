//! The synchronization engine.

use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::git;
use crate::merge::{self, merge_message};
use crate::outcome::{Author, MergeOutcome, Resolution, ResolutionKind, SyncOutcome};
use frontier_lfs::{
    slash_path, worktree_changes, Credentials, ReconcileReport, StageReport, TransferFailure,
    TransferProgress,
};
use frontier_lock::{check_filesystem_lock, phase, LeaseGuard, LockStatus, Progress, SyncLock};
use frontier_maintenance::{
    cleanup_orphaned_packs, pack_dir, CleanupReport, PackConfig, PackReport, Packer,
};
use git2::{Oid, Repository};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Syncs that ran to completion, conflicts included.
    pub syncs_completed: u64,
    /// Syncs skipped because another sync held the lease.
    pub syncs_skipped: u64,
    /// Local commits created from working-tree changes.
    pub commits_created: u64,
    /// Successful pushes.
    pub pushes: u64,
    /// Conflicted paths surfaced to the caller.
    pub conflicts_encountered: u64,
    /// Retries made by [`SyncEngine::sync_with_retry`].
    pub retries: u64,
    /// Last successful sync.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Synchronizes one workspace with its origin remote.
///
/// Every public operation runs under the workspace lease. The lease is
/// released when the operation returns, whatever the outcome.
pub struct SyncEngine {
    ctx: Arc<SyncContext>,
    workspace: PathBuf,
    lock: Arc<SyncLock>,
    stats: RwLock<SyncStats>,
}

impl SyncEngine {
    pub(crate) fn new(ctx: Arc<SyncContext>, workspace: PathBuf, lock: Arc<SyncLock>) -> Self {
        Self {
            ctx,
            workspace,
            lock,
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the canonical workspace path.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Returns the workspace lease.
    pub fn lock(&self) -> &Arc<SyncLock> {
        &self.lock
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Classifies the workspace lease without touching it.
    pub fn lock_status(&self) -> SyncResult<LockStatus> {
        Ok(check_filesystem_lock(&self.workspace, &self.ctx.config().lock)?)
    }

    fn repo(&self) -> SyncResult<Repository> {
        Repository::open(&self.workspace).map_err(|e| {
            SyncError::PreconditionFailure(format!(
                "{} is not a repository: {}",
                self.workspace.display(),
                e.message()
            ))
        })
    }

    /// Commits local changes, then brings local and remote together.
    ///
    /// Returns a skipped outcome if another sync holds the lease. Conflicts
    /// come back in the outcome; resolve them with
    /// [`complete_merge`](Self::complete_merge).
    pub fn sync_changes(&self, auth: &Credentials, author: &Author) -> SyncResult<SyncOutcome> {
        let Some(lease) = self.lock.try_lock()? else {
            info!(workspace = %self.workspace.display(), "sync already in progress, skipping");
            self.stats.write().syncs_skipped += 1;
            return Ok(SyncOutcome::skipped());
        };

        let result = self
            .repo()
            .and_then(|repo| self.sync_locked(&lease, &repo, auth, author));
        drop(lease);

        let mut stats = self.stats.write();
        match &result {
            Ok(outcome) => {
                stats.syncs_completed += 1;
                stats.commits_created += u64::from(outcome.committed.is_some());
                stats.pushes += u64::from(outcome.pushed);
                stats.conflicts_encountered += outcome.conflicts.len() as u64;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
            }
            Err(e) => stats.last_error = Some(e.to_string()),
        }
        result
    }

    /// Performs a sync with retry on transient errors.
    pub fn sync_with_retry(&self, auth: &Credentials, author: &Author) -> SyncResult<SyncOutcome> {
        let retry_config = &self.ctx.config().retry;
        let mut last_error = None;

        for attempt in 0..retry_config.max_attempts {
            if attempt > 0 {
                let delay = retry_config.delay_for_attempt(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying sync");
                std::thread::sleep(delay);
                self.stats.write().retries += 1;
            }

            match self.sync_changes(auth, author) {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    if e.is_retryable() && attempt + 1 < retry_config.max_attempts {
                        warn!(attempt, error = %e, "sync failed, will retry");
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| SyncError::PreconditionFailure("no sync attempts made".into())))
    }

    fn sync_locked(
        &self,
        lease: &LeaseGuard,
        repo: &Repository,
        auth: &Credentials,
        author: &Author,
    ) -> SyncResult<SyncOutcome> {
        lease.update(phase::STARTING, None);
        let branch = git::current_branch(repo)?;
        let url = git::origin_url(repo)?;
        let online = self.ctx.probe().is_reachable(&url);
        let mut outcome = SyncOutcome::default();

        let uploaded =
            self.commit_local_changes(lease, repo, &branch, auth, author, online, &mut outcome)?;

        if !online {
            info!(
                workspace = %self.workspace.display(),
                committed = outcome.committed.is_some(),
                "remote unreachable, skipping network steps"
            );
            outcome.offline = true;
            return Ok(outcome);
        }

        lease.update(phase::FETCHING, None);
        git::fetch(repo, &branch, auth)?;
        let local = git::head_oid(repo)?;
        let remote = git::remote_oid(repo, &branch);
        debug!(branch = %branch, local = ?local, remote = ?remote, "fetched");

        match (local, remote) {
            (None, None) => debug!("nothing committed on either side"),
            (None, Some(remote)) => {
                self.move_to(lease, repo, &branch, None, remote, auth, &mut outcome)?;
            }
            (Some(_), None) => {
                info!(branch = %branch, "remote branch missing, first push");
                self.push_and_verify(lease, repo, &branch, None, auth, &uploaded, &mut outcome)?;
            }
            (Some(local), Some(remote)) if local == remote => {
                debug!(commit = %local, "already in sync");
            }
            (Some(local), Some(remote)) => {
                self.integrate(
                    lease,
                    repo,
                    &branch,
                    local,
                    remote,
                    auth,
                    author,
                    &uploaded,
                    &mut outcome,
                )?;
            }
        }

        if outcome.committed.is_some() || outcome.merged.is_some() || outcome.fast_forwarded {
            self.maintain(lease);
        }
        Ok(outcome)
    }

    /// Stages and commits working-tree changes. Returns the paths whose
    /// bytes were already uploaded while staging.
    #[allow(clippy::too_many_arguments)]
    fn commit_local_changes(
        &self,
        lease: &LeaseGuard,
        repo: &Repository,
        branch: &str,
        auth: &Credentials,
        author: &Author,
        online: bool,
        outcome: &mut SyncOutcome,
    ) -> SyncResult<BTreeSet<PathBuf>> {
        let large_files = self.ctx.large_files();
        if worktree_changes(repo, large_files.layout())?.is_empty() {
            return Ok(BTreeSet::new());
        }

        lease.update(phase::STAGING, None);
        let report = if online {
            large_files.stage_all_with_progress(repo, auth, &|p| {
                lease.update(phase::TRANSFERRING, Some(transfer(p, "uploading large files")))
            })?
        } else {
            large_files.stage_all_offline(repo)?
        };
        note_failures(&report.failed_uploads, "upload", &mut outcome.warnings);
        for quarantined in &report.quarantined {
            outcome.warnings.push(format!(
                "corrupted pointer {} moved to {}",
                slash_path(&quarantined.path),
                quarantined.quarantined_to.display()
            ));
        }

        let uploaded = if online { uploaded_paths(&report) } else { BTreeSet::new() };
        if report.has_changes() {
            lease.update(phase::COMMITTING, None);
            let message = format!(
                "Sync: {} added, {} modified, {} deleted",
                report.added.len(),
                report.modified.len(),
                report.deleted.len()
            );
            let parents: Vec<Oid> = git::head_oid(repo)?.into_iter().collect();
            let mut index = repo.index()?;
            let commit = git::commit_index(repo, &mut index, author, &message, &parents)?;
            repo.reference(&format!("refs/heads/{branch}"), commit, true, &message)?;
            info!(commit = %commit, message = %message, "committed local changes");
            outcome.committed = Some(commit);
        }
        outcome.stage = Some(report);
        Ok(uploaded)
    }

    #[allow(clippy::too_many_arguments)]
    fn integrate(
        &self,
        lease: &LeaseGuard,
        repo: &Repository,
        branch: &str,
        local: Oid,
        remote: Oid,
        auth: &Credentials,
        author: &Author,
        uploaded: &BTreeSet<PathBuf>,
        outcome: &mut SyncOutcome,
    ) -> SyncResult<()> {
        if repo.graph_descendant_of(remote, local)? {
            return self.move_to(lease, repo, branch, Some(local), remote, auth, outcome);
        }
        if repo.graph_descendant_of(local, remote)? {
            let remote = Some(remote);
            return self.push_and_verify(lease, repo, branch, remote, auth, uploaded, outcome);
        }

        lease.update(phase::ANALYZING, None);
        let divergence = merge::analyze(repo, local, remote)?;
        if !divergence.conflicts.is_empty() {
            info!(
                conflicts = divergence.conflicts.len(),
                "histories diverged with conflicts, waiting for resolutions"
            );
            outcome.had_conflicts = true;
            outcome.conflicts = divergence.conflicts;
            return Ok(());
        }

        let dirty = worktree_changes(repo, self.ctx.large_files().layout())?;
        if !dirty.is_empty() {
            return Err(SyncError::DirtyWorkingTree(
                dirty.iter().map(|change| slash_path(&change.path)).collect(),
            ));
        }

        if divergence.local_only.is_empty() {
            debug!("every local change already on the remote");
            return self.move_to(lease, repo, branch, Some(local), remote, auth, outcome);
        }

        lease.update(phase::MERGING, None);
        let merged = merge::merge_heads(repo, local, remote, &[], author, &merge_message(&[]))?;
        git::move_branch(repo, branch, Some(local), merged, "sync: merge")?;
        info!(
            commit = %merged,
            local_only = divergence.local_only.len(),
            "merged diverged histories"
        );
        outcome.merged = Some(merged);
        self.push_and_verify(lease, repo, branch, Some(remote), auth, uploaded, outcome)?;
        outcome.reconcile = self.reconcile_best_effort(lease, repo, auth, &mut outcome.warnings);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn move_to(
        &self,
        lease: &LeaseGuard,
        repo: &Repository,
        branch: &str,
        from: Option<Oid>,
        to: Oid,
        auth: &Credentials,
        outcome: &mut SyncOutcome,
    ) -> SyncResult<()> {
        git::move_branch(repo, branch, from, to, "sync: fast-forward")?;
        info!(branch, commit = %to, "fast-forwarded to remote");
        outcome.fast_forwarded = true;
        outcome.reconcile = self.reconcile_best_effort(lease, repo, auth, &mut outcome.warnings);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn push_and_verify(
        &self,
        lease: &LeaseGuard,
        repo: &Repository,
        branch: &str,
        remote: Option<Oid>,
        auth: &Credentials,
        uploaded: &BTreeSet<PathBuf>,
        outcome: &mut SyncOutcome,
    ) -> SyncResult<()> {
        lease.update(phase::PUSHING, None);
        self.upload_before_push(lease, repo, remote, auth, uploaded, &mut outcome.warnings)?;
        git::push(repo, branch, auth, false)?;
        outcome.pushed = true;

        if !self.ctx.config().verify_after_push {
            return Ok(());
        }
        let local = git::head_oid(repo)?;
        match git::remote_head(repo, branch, auth) {
            Ok(head) if head == local => debug!("push verified"),
            Ok(head) => {
                warn!(remote = ?head, local = ?local, "remote head differs after push");
                outcome.warnings.push(format!(
                    "remote {branch} is at {} after push, expected {}",
                    describe(head),
                    describe(local)
                ));
            }
            Err(e) => {
                warn!(error = %e, "could not verify push");
                outcome.warnings.push(format!("could not verify push: {e}"));
            }
        }
        Ok(())
    }

    /// Uploads bytes behind pointers about to be pushed, skipping paths
    /// already uploaded in this sync.
    fn upload_before_push(
        &self,
        lease: &LeaseGuard,
        repo: &Repository,
        remote: Option<Oid>,
        auth: &Credentials,
        skip: &BTreeSet<PathBuf>,
        warnings: &mut Vec<String>,
    ) -> SyncResult<()> {
        let Some(local) = git::head_oid(repo)? else {
            return Ok(());
        };
        let paths: Vec<PathBuf> = git::changed_paths(repo, remote, local)?
            .into_iter()
            .filter(|path| !skip.contains(path))
            .collect();
        if paths.is_empty() {
            return Ok(());
        }
        let report = self.ctx.large_files().upload_committed(repo, &paths, auth, &|p| {
            lease.update(phase::TRANSFERRING, Some(transfer(p, "uploading large files")))
        })?;
        note_failures(&report.failed_uploads, "upload", warnings);
        Ok(())
    }

    fn reconcile_best_effort(
        &self,
        lease: &LeaseGuard,
        repo: &Repository,
        auth: &Credentials,
        warnings: &mut Vec<String>,
    ) -> Option<ReconcileReport> {
        if !self.ctx.config().reconcile_after_sync {
            return None;
        }
        lease.update(phase::RECONCILING, None);
        let reconciled = self.ctx.large_files().reconcile_with_progress(repo, auth, &|p| {
            lease.update(phase::RECONCILING, Some(transfer(p, "downloading large files")))
        });
        match reconciled {
            Ok(report) => {
                note_failures(&report.failed, "download", warnings);
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "large-file reconciliation failed");
                warnings.push(format!("large-file reconciliation failed: {e}"));
                None
            }
        }
    }

    fn maintain(&self, lease: &LeaseGuard) {
        let packer = Packer::new(
            PackConfig::default().with_loose_threshold(self.ctx.config().pack_threshold),
        );
        match packer.should_pack(&self.workspace) {
            Ok(true) => {
                lease.update(phase::PACKING, None);
                match packer.pack(&self.workspace) {
                    Ok(report) => info!(packed = report.objects_packed, "packed loose objects"),
                    Err(e) => warn!(error = %e, "opportunistic packing failed"),
                }
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "could not count loose objects"),
        }
    }

    /// Commits the caller's resolutions as a merge of local and remote,
    /// then pushes it.
    ///
    /// Fails with [`SyncError::LockContention`] if a sync is running, and
    /// with [`SyncError::DirtyWorkingTree`] if paths other than the resolved
    /// ones have uncommitted changes. The remote is fetched again first, so
    /// a remote that advanced since the conflicts were reported is merged
    /// too.
    pub fn complete_merge(
        &self,
        auth: &Credentials,
        author: &Author,
        resolutions: &[Resolution],
    ) -> SyncResult<MergeOutcome> {
        let Some(lease) = self.lock.try_lock()? else {
            return Err(SyncError::LockContention(self.workspace.clone()));
        };
        let result = self
            .repo()
            .and_then(|repo| self.complete_merge_locked(&lease, &repo, auth, author, resolutions));
        drop(lease);

        if let Ok(outcome) = &result {
            let mut stats = self.stats.write();
            stats.pushes += 1;
            stats.last_sync_time = Some(Instant::now());
            debug!(commit = %outcome.commit, forced = outcome.forced, "merge completed");
        }
        result
    }

    fn complete_merge_locked(
        &self,
        lease: &LeaseGuard,
        repo: &Repository,
        auth: &Credentials,
        author: &Author,
        resolutions: &[Resolution],
    ) -> SyncResult<MergeOutcome> {
        lease.update(phase::MERGING, None);
        let branch = git::current_branch(repo)?;
        git::origin_url(repo)?;
        let local = git::head_oid(repo)?.ok_or_else(|| {
            SyncError::PreconditionFailure("nothing committed locally; sync first".into())
        })?;

        let resolved: BTreeSet<&Path> = resolutions.iter().map(|r| r.filepath.as_path()).collect();
        let dirty: Vec<String> = worktree_changes(repo, self.ctx.large_files().layout())?
            .iter()
            .filter(|change| !resolved.contains(change.path.as_path()))
            .map(|change| slash_path(&change.path))
            .collect();
        if !dirty.is_empty() {
            return Err(SyncError::DirtyWorkingTree(dirty));
        }

        let mut warnings = Vec::new();
        let kept: Vec<PathBuf> = resolutions
            .iter()
            .filter(|r| r.resolution != ResolutionKind::Deleted)
            .map(|r| r.filepath.clone())
            .collect();
        let prepared = self.ctx.large_files().prepare_paths(repo, &kept)?;
        for quarantined in &prepared.quarantined {
            warnings.push(format!(
                "corrupted pointer {} moved to {}",
                slash_path(&quarantined.path),
                quarantined.quarantined_to.display()
            ));
        }

        lease.update(phase::FETCHING, None);
        git::fetch(repo, &branch, auth)?;
        let remote = git::remote_oid(repo, &branch).ok_or_else(|| {
            SyncError::PreconditionFailure(format!("origin has no branch {branch}; sync instead"))
        })?;

        lease.update(phase::MERGING, None);
        let message = merge_message(resolutions);
        let merged = merge::merge_heads(repo, local, remote, resolutions, author, &message)?;
        git::move_branch(repo, &branch, Some(local), merged, "merge: resolved conflicts")?;
        info!(commit = %merged, resolutions = resolutions.len(), "created merge commit");

        let mut outcome = MergeOutcome {
            commit: merged,
            forced: false,
            warnings,
        };
        self.push_merge(lease, repo, &branch, remote, auth, author, &mut outcome)?;
        self.reconcile_best_effort(lease, repo, auth, &mut outcome.warnings);
        Ok(outcome)
    }

    /// Normal push first. If it is rejected, force only when the remote
    /// provably did not move; otherwise merge once more and retry, and
    /// force as a last resort with a warning.
    #[allow(clippy::too_many_arguments)]
    fn push_merge(
        &self,
        lease: &LeaseGuard,
        repo: &Repository,
        branch: &str,
        remote_before: Oid,
        auth: &Credentials,
        author: &Author,
        outcome: &mut MergeOutcome,
    ) -> SyncResult<()> {
        let none = BTreeSet::new();
        lease.update(phase::PUSHING, None);
        let warnings = &mut outcome.warnings;
        self.upload_before_push(lease, repo, Some(remote_before), auth, &none, warnings)?;
        match git::push(repo, branch, auth, false) {
            Ok(()) => return Ok(()),
            Err(e) if ends_push(&e) => return Err(e),
            Err(e) => warn!(error = %e, "merge push rejected, re-checking remote"),
        }

        lease.update(phase::FETCHING, None);
        git::fetch(repo, branch, auth)?;
        match after_rejection(remote_before, git::remote_oid(repo, branch)) {
            Rejection::Unchanged | Rejection::Gone => {
                lease.update(phase::PUSHING, None);
                git::push(repo, branch, auth, true)?;
                info!(branch, "nothing new on the remote, forced merge push");
                outcome.forced = true;
                return Ok(());
            }
            Rejection::Moved(remote_now) => {
                lease.update(phase::MERGING, None);
                let local = outcome.commit;
                let message = merge_message(&[]);
                let merged = merge::merge_heads(repo, local, remote_now, &[], author, &message)?;
                git::move_branch(repo, branch, Some(local), merged, "merge: remote moved")?;
                info!(commit = %merged, remote = %remote_now, "merged remote changes again");
                outcome.commit = merged;

                lease.update(phase::PUSHING, None);
                let warnings = &mut outcome.warnings;
                self.upload_before_push(lease, repo, Some(remote_now), auth, &none, warnings)?;
                match git::push(repo, branch, auth, false) {
                    Ok(()) => return Ok(()),
                    Err(e) if ends_push(&e) => return Err(e),
                    Err(e) => warn!(error = %e, "push after second merge rejected"),
                }
            }
        }

        git::push(repo, branch, auth, true)?;
        warn!(branch, "forced merge push while the remote kept changing");
        outcome.forced = true;
        outcome.warnings.push(
            "forced push after the remote kept changing; \
             concurrent remote changes may have been overwritten"
                .into(),
        );
        Ok(())
    }

    /// Applies the workspace's media strategy to committed pointers.
    pub fn reconcile(&self, auth: &Credentials) -> SyncResult<ReconcileReport> {
        let Some(lease) = self.lock.try_lock()? else {
            return Err(SyncError::LockContention(self.workspace.clone()));
        };
        lease.update(phase::RECONCILING, None);
        let repo = self.repo()?;
        let report = self.ctx.large_files().reconcile_with_progress(&repo, auth, &|p| {
            lease.update(phase::RECONCILING, Some(transfer(p, "downloading large files")))
        })?;
        Ok(report)
    }

    /// Packs loose objects and removes orphaned pack artifacts.
    pub fn pack(&self) -> SyncResult<PackReport> {
        let Some(lease) = self.lock.try_lock()? else {
            return Err(SyncError::LockContention(self.workspace.clone()));
        };
        lease.update(phase::PACKING, None);
        Ok(Packer::new(PackConfig::default()).pack(&self.workspace)?)
    }

    /// Removes pack artifacts left by interrupted operations.
    pub fn cleanup_packs(&self) -> SyncResult<CleanupReport> {
        let Some(lease) = self.lock.try_lock()? else {
            return Err(SyncError::LockContention(self.workspace.clone()));
        };
        lease.update(phase::PACKING, None);
        let repo = self.repo()?;
        Ok(cleanup_orphaned_packs(&pack_dir(&repo))?)
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("workspace", &self.workspace)
            .field("held", &self.lock.is_held())
            .finish_non_exhaustive()
    }
}

/// What origin holds after a merge push was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    /// Still the commit the merge was built on.
    Unchanged,
    /// Advanced to another commit.
    Moved(Oid),
    /// The branch was deleted.
    Gone,
}

fn after_rejection(before: Oid, now: Option<Oid>) -> Rejection {
    match now {
        Some(now) if now == before => Rejection::Unchanged,
        Some(now) => Rejection::Moved(now),
        None => Rejection::Gone,
    }
}

/// Errors a forcing push cannot fix.
fn ends_push(err: &SyncError) -> bool {
    matches!(
        err,
        SyncError::AuthenticationFailed
            | SyncError::AccessDenied
            | SyncError::HostUnreachable(_)
            | SyncError::ConnectionTimeout(_)
    )
}

fn transfer(progress: TransferProgress, description: &str) -> Progress {
    Progress::new(progress.completed, progress.total, description)
}

fn note_failures(failures: &[TransferFailure], what: &str, warnings: &mut Vec<String>) {
    for failure in failures {
        let paths: Vec<String> = failure.paths.iter().map(|p| slash_path(p)).collect();
        warnings.push(format!(
            "{what} of {} ({}) failed: {}",
            failure.oid,
            paths.join(", "),
            failure.message
        ));
    }
}

fn uploaded_paths(report: &StageReport) -> BTreeSet<PathBuf> {
    let failed: BTreeSet<&PathBuf> = report
        .failed_uploads
        .iter()
        .flat_map(|failure| failure.paths.iter())
        .collect();
    report
        .added
        .iter()
        .chain(&report.modified)
        .filter(|path| !failed.contains(path))
        .cloned()
        .collect()
}

fn describe(oid: Option<Oid>) -> String {
    oid.map_or_else(|| "nothing".to_string(), |oid| oid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(byte: u8) -> Oid {
        Oid::from_bytes(&[byte; 20]).unwrap()
    }

    #[test]
    fn rejected_push_against_unchanged_remote_forces() {
        assert_eq!(after_rejection(oid(1), Some(oid(1))), Rejection::Unchanged);
    }

    #[test]
    fn rejected_push_against_moved_remote_merges_again() {
        assert_eq!(after_rejection(oid(1), Some(oid(2))), Rejection::Moved(oid(2)));
    }

    #[test]
    fn rejected_push_against_deleted_branch_recreates_it() {
        assert_eq!(after_rejection(oid(1), None), Rejection::Gone);
    }

    #[test]
    fn only_transport_and_auth_errors_end_a_merge_push() {
        assert!(ends_push(&SyncError::AuthenticationFailed));
        assert!(ends_push(&SyncError::HostUnreachable("origin".into())));
        assert!(!ends_push(&SyncError::RemoteChangedSinceSync));
    }
}
