//! Repository plumbing over `git2`.

use crate::error::{classify_git_error, SyncError, SyncResult};
use crate::outcome::Author;
use frontier_lfs::{repo_path, Credentials, ORIGIN};
use git2::build::CheckoutBuilder;
use git2::{
    Cred, CredentialType, ErrorCode, FetchOptions, FetchPrune, Index, Oid, PushOptions,
    RemoteCallbacks, Repository,
};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Credential attempts before giving up, so a rejected password does not
/// loop forever inside libgit2.
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// Name of the checked-out branch.
pub fn current_branch(repo: &Repository) -> SyncResult<String> {
    let head = repo
        .find_reference("HEAD")
        .map_err(|_| SyncError::PreconditionFailure("repository has no HEAD".into()))?;
    let target = match head.symbolic_target() {
        Some(target) => target.to_string(),
        None => {
            return Err(SyncError::PreconditionFailure(
                "HEAD is detached; check out a branch".into(),
            ))
        }
    };
    target
        .strip_prefix("refs/heads/")
        .map(str::to_string)
        .ok_or_else(|| SyncError::PreconditionFailure(format!("HEAD points at {target}")))
}

/// Commit the current branch points at, or `None` before the first commit.
pub fn head_oid(repo: &Repository) -> SyncResult<Option<Oid>> {
    match repo.head() {
        Ok(head) => Ok(head.target()),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// URL of the origin remote.
pub fn origin_url(repo: &Repository) -> SyncResult<String> {
    let remote = repo
        .find_remote(ORIGIN)
        .map_err(|_| SyncError::PreconditionFailure(format!("no {ORIGIN} remote configured")))?;
    remote
        .url()
        .map(str::to_string)
        .ok_or_else(|| SyncError::PreconditionFailure(format!("{ORIGIN} URL is not UTF-8")))
}

fn tracking_ref(branch: &str) -> String {
    format!("refs/remotes/{ORIGIN}/{branch}")
}

/// Commit of the remote-tracking branch, as of the last fetch.
pub fn remote_oid(repo: &Repository, branch: &str) -> Option<Oid> {
    repo.refname_to_id(&tracking_ref(branch)).ok()
}

fn callbacks<'a>(auth: &Credentials) -> RemoteCallbacks<'a> {
    let auth = auth.clone();
    let mut attempts = 0;
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::new(
                ErrorCode::Auth,
                git2::ErrorClass::Net,
                "authentication failed",
            ));
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            return Cred::userpass_plaintext(&auth.username, &auth.password);
        }
        if allowed.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
        }
        if allowed.contains(CredentialType::USERNAME) {
            return Cred::username(username_from_url.unwrap_or(&auth.username));
        }
        Cred::default()
    });
    callbacks
}

/// Fetches every origin branch into its remote-tracking ref, pruning
/// tracking refs of branches origin no longer has.
///
/// A branch missing on origin is not an error. Its tracking ref is absent
/// afterwards, even if an earlier fetch or push had created it.
pub fn fetch(repo: &Repository, branch: &str, auth: &Credentials) -> SyncResult<()> {
    let mut remote = repo.find_remote(ORIGIN)?;
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks(auth));
    options.prune(FetchPrune::On);

    // Dropped up front: an origin with no refs at all is never pruned.
    drop_tracking_ref(repo, branch)?;

    let refspec = format!("+refs/heads/*:refs/remotes/{ORIGIN}/*");
    remote
        .fetch(&[refspec.as_str()], Some(&mut options), None)
        .map_err(classify_git_error)?;
    debug!(branch, remote = ?remote_oid(repo, branch), "fetched");
    Ok(())
}

fn drop_tracking_ref(repo: &Repository, branch: &str) -> SyncResult<()> {
    match repo.find_reference(&tracking_ref(branch)) {
        Ok(mut reference) => Ok(reference.delete()?),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Pushes the local branch to origin and updates the tracking ref.
pub fn push(repo: &Repository, branch: &str, auth: &Credentials, force: bool) -> SyncResult<()> {
    let local = repo.refname_to_id(&format!("refs/heads/{branch}"))?;
    let mut remote = repo.find_remote(ORIGIN)?;
    let refspec = format!(
        "{}refs/heads/{branch}:refs/heads/{branch}",
        if force { "+" } else { "" }
    );

    let rejection: RefCell<Option<String>> = RefCell::new(None);
    {
        let mut callbacks = callbacks(auth);
        callbacks.push_update_reference(|_refname, status| {
            if let Some(message) = status {
                *rejection.borrow_mut() = Some(message.to_string());
            }
            Ok(())
        });
        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);
        remote
            .push(&[refspec.as_str()], Some(&mut options))
            .map_err(classify_git_error)?;
    }
    if let Some(message) = rejection.into_inner() {
        return Err(classify_git_error(git2::Error::new(
            ErrorCode::NotFastForward,
            git2::ErrorClass::Reference,
            format!("push rejected: {message}"),
        )));
    }

    repo.reference(&tracking_ref(branch), local, true, "push")?;
    info!(branch, commit = %local, force, "pushed");
    Ok(())
}

/// Asks origin where `branch` points now. Refreshes the tracking ref.
pub fn remote_head(repo: &Repository, branch: &str, auth: &Credentials) -> SyncResult<Option<Oid>> {
    fetch(repo, branch, auth)?;
    Ok(remote_oid(repo, branch))
}

/// Commits `index` as the new tip of the current branch.
pub fn commit_index(
    repo: &Repository,
    index: &mut Index,
    author: &Author,
    message: &str,
    parents: &[Oid],
) -> SyncResult<Oid> {
    let tree = repo.find_tree(index.write_tree_to(repo)?)?;
    let parents = parents
        .iter()
        .map(|oid| repo.find_commit(*oid))
        .collect::<Result<Vec<_>, _>>()?;
    let parent_refs: Vec<_> = parents.iter().collect();
    let signature = author.signature()?;
    let oid = repo.commit(None, &signature, &signature, message, &tree, &parent_refs)?;
    debug!(commit = %oid, parents = parents.len(), "committed");
    Ok(oid)
}

/// Paths whose content differs between two commits. `None` stands for the
/// empty tree.
pub fn changed_paths(
    repo: &Repository,
    from: Option<Oid>,
    to: Oid,
) -> SyncResult<BTreeSet<PathBuf>> {
    let old = from.map(|oid| repo.find_commit(oid).and_then(|c| c.tree())).transpose()?;
    let new = repo.find_commit(to)?.tree()?;
    let diff = repo.diff_tree_to_tree(old.as_ref(), Some(&new), None)?;

    let mut paths = BTreeSet::new();
    for delta in diff.deltas() {
        for file in [delta.old_file(), delta.new_file()] {
            if let Some(path) = file.path().and_then(Path::to_str).and_then(repo_path) {
                paths.insert(path);
            }
        }
    }
    Ok(paths)
}

/// Bytes of `path` at `commit`, or empty if anything is missing.
pub fn read_blob_at(repo: &Repository, commit: Oid, path: &Path) -> Vec<u8> {
    let read = || -> Result<Vec<u8>, git2::Error> {
        let tree = repo.find_commit(commit)?.tree()?;
        let entry = tree.get_path(path)?;
        let blob = entry.to_object(repo)?.peel_to_blob()?;
        Ok(blob.content().to_vec())
    };
    read().unwrap_or_default()
}

/// Moves the current branch from `from` to `to`, updating the working tree
/// and index only for the paths that differ between the two.
pub fn move_branch(
    repo: &Repository,
    branch: &str,
    from: Option<Oid>,
    to: Oid,
    reason: &str,
) -> SyncResult<()> {
    let paths = changed_paths(repo, from, to)?;
    if !paths.is_empty() {
        let target = repo.find_commit(to)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force().disable_pathspec_match(true);
        for path in &paths {
            checkout.path(path.as_path());
        }
        repo.checkout_tree(target.as_object(), Some(&mut checkout))?;
    }
    repo.reference(&format!("refs/heads/{branch}"), to, true, reason)?;
    debug!(branch, commit = %to, paths = paths.len(), reason, "branch moved");
    Ok(())
}
