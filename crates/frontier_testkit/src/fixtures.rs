//! Git repository fixtures.
//!
//! A `TestRemote` is a bare repository standing in for origin. Each
//! `TestWorkspace` is a working repository whose origin points at it, so
//! fetch and push run over the local transport without a network.

use git2::{Index, IndexAddOption, IndexEntry, IndexTime, Oid, Repository, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Branch every fixture works on.
pub const BRANCH: &str = "main";

/// Author name used by fixture commits.
pub const TEST_AUTHOR_NAME: &str = "Test Author";

/// Author email used by fixture commits.
pub const TEST_AUTHOR_EMAIL: &str = "test@example.com";

/// A bare repository in a temporary directory.
pub struct TestRemote {
    repo: Repository,
    _temp_dir: TempDir,
}

impl TestRemote {
    /// Creates an empty bare repository whose HEAD names [`BRANCH`].
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let repo = Repository::init_bare(temp_dir.path()).expect("Failed to init bare repository");
        repo.set_head(&format!("refs/heads/{BRANCH}"))
            .expect("Failed to set HEAD");
        Self {
            repo,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the repository path.
    pub fn path(&self) -> &Path {
        self.repo.path()
    }

    /// Returns the URL workspaces use for origin.
    pub fn url(&self) -> String {
        self.path().to_string_lossy().into_owned()
    }

    /// Creates a fresh workspace with origin pointing here.
    ///
    /// The workspace starts unborn; a sync fast-forwards it to the remote.
    pub fn workspace(&self) -> TestWorkspace {
        TestWorkspace::with_origin(&self.url())
    }

    /// Commit `branch` points at.
    pub fn head(&self, branch: &str) -> Option<Oid> {
        self.repo.refname_to_id(&format!("refs/heads/{branch}")).ok()
    }

    /// Bytes of `path` on the tip of [`BRANCH`].
    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        let commit = self.repo.find_commit(self.head(BRANCH)?).ok()?;
        let entry = commit.tree().ok()?.get_path(Path::new(path)).ok()?;
        let blob = entry.to_object(&self.repo).ok()?.peel_to_blob().ok()?;
        Some(blob.content().to_vec())
    }

    /// Commits one file straight onto [`BRANCH`], as another client's push
    /// would.
    pub fn commit_file(&self, rel: &str, bytes: &[u8], message: &str) -> Oid {
        commit_on_remote(self.path(), rel, bytes, message)
    }

    /// Deletes [`BRANCH`] on the remote.
    pub fn delete_branch(&self) {
        self.repo
            .find_reference(&format!("refs/heads/{BRANCH}"))
            .expect("branch exists")
            .delete()
            .expect("Failed to delete branch");
    }

    /// Returns true if `ancestor` is reachable from the tip of [`BRANCH`].
    pub fn contains_commit(&self, ancestor: Oid) -> bool {
        let Some(head) = self.head(BRANCH) else {
            return false;
        };
        head == ancestor
            || self
                .repo
                .graph_descendant_of(head, ancestor)
                .expect("Failed to walk history")
    }

    /// Number of commits reachable from [`BRANCH`].
    pub fn commit_count(&self) -> usize {
        let Some(head) = self.head(BRANCH) else {
            return 0;
        };
        let mut walk = self.repo.revwalk().expect("Failed to create revwalk");
        walk.push(head).expect("Failed to push head");
        walk.count()
    }
}

impl Default for TestRemote {
    fn default() -> Self {
        Self::new()
    }
}

/// A working repository in a temporary directory.
pub struct TestWorkspace {
    repo: Repository,
    _temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates an unborn repository on [`BRANCH`] with the given origin.
    pub fn with_origin(url: &str) -> Self {
        let workspace = Self::without_origin();
        workspace
            .repo
            .remote("origin", url)
            .expect("Failed to add origin");
        workspace
    }

    /// Creates an unborn repository on [`BRANCH`] with no remote.
    pub fn without_origin() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let repo = Repository::init(temp_dir.path()).expect("Failed to init repository");
        repo.set_head(&format!("refs/heads/{BRANCH}"))
            .expect("Failed to set HEAD");
        Self {
            repo,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the working directory.
    pub fn path(&self) -> &Path {
        self.repo.workdir().expect("workspace has a working tree")
    }

    /// Returns the repository.
    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Absolute path of a workspace-relative path.
    pub fn join(&self, rel: &str) -> PathBuf {
        self.path().join(rel)
    }

    /// Writes a file, creating parent directories.
    pub fn write(&self, rel: &str, bytes: &[u8]) {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(path, bytes).expect("Failed to write file");
    }

    /// Reads a file.
    pub fn read(&self, rel: &str) -> Vec<u8> {
        fs::read(self.join(rel)).expect("Failed to read file")
    }

    /// Returns true if the file exists.
    pub fn exists(&self, rel: &str) -> bool {
        self.join(rel).exists()
    }

    /// Removes a file.
    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.join(rel)).expect("Failed to remove file");
    }

    /// Commit HEAD points at.
    pub fn head(&self) -> Option<Oid> {
        self.repo.head().ok().and_then(|head| head.target())
    }

    /// Parents of HEAD.
    pub fn head_parents(&self) -> Vec<Oid> {
        let head = self.head().expect("HEAD is born");
        self.repo
            .find_commit(head)
            .expect("Failed to find HEAD commit")
            .parent_ids()
            .collect()
    }

    /// Message of HEAD.
    pub fn head_message(&self) -> String {
        let head = self.head().expect("HEAD is born");
        let commit = self.repo.find_commit(head).expect("Failed to find HEAD commit");
        commit.message().unwrap_or_default().to_string()
    }

    /// Stages everything and commits it on the current branch.
    pub fn commit_all(&self, message: &str) -> Oid {
        let mut index = self.repo.index().expect("Failed to open index");
        index
            .add_all(["*"], IndexAddOption::DEFAULT, None)
            .expect("Failed to add files");
        index.update_all(["*"], None).expect("Failed to update index");
        index.write().expect("Failed to write index");
        let tree_id = index.write_tree().expect("Failed to write tree");
        let tree = self.repo.find_tree(tree_id).expect("Failed to find tree");

        let signature = Signature::now(TEST_AUTHOR_NAME, TEST_AUTHOR_EMAIL)
            .expect("Failed to create signature");
        let parent = self.head().map(|oid| {
            self.repo
                .find_commit(oid)
                .expect("Failed to find parent commit")
        });
        let parents: Vec<_> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .expect("Failed to commit")
    }

    /// Pushes [`BRANCH`] to origin without going through the engine.
    pub fn push(&self) {
        let mut remote = self.repo.find_remote("origin").expect("origin exists");
        let refspec = format!("refs/heads/{BRANCH}:refs/heads/{BRANCH}");
        remote.push(&[refspec.as_str()], None).expect("Failed to push");
    }

    /// Returns true if nothing differs from HEAD, untracked files included.
    pub fn is_clean(&self) -> bool {
        let mut options = git2::StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        self.repo
            .statuses(Some(&mut options))
            .expect("Failed to read status")
            .is_empty()
    }
}

/// Commits one file onto [`BRANCH`] of the bare repository at `path`.
///
/// Takes a path rather than a [`TestRemote`] so it can run inside callbacks
/// that must be `Send`.
pub fn commit_on_remote(path: &Path, rel: &str, bytes: &[u8], message: &str) -> Oid {
    let repo = Repository::open_bare(path).expect("Failed to open bare repository");
    let branch_ref = format!("refs/heads/{BRANCH}");
    let parent = repo
        .refname_to_id(&branch_ref)
        .ok()
        .map(|oid| repo.find_commit(oid).expect("Failed to find branch tip"));

    let mut index = Index::new().expect("Failed to create index");
    if let Some(parent) = &parent {
        index
            .read_tree(&parent.tree().expect("Failed to read tree"))
            .expect("Failed to load tree");
    }
    index
        .add(&IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: bytes.len() as u32,
            id: repo.blob(bytes).expect("Failed to write blob"),
            flags: 0,
            flags_extended: 0,
            path: rel.as_bytes().to_vec(),
        })
        .expect("Failed to add entry");
    let tree_id = index.write_tree_to(&repo).expect("Failed to write tree");
    let tree = repo.find_tree(tree_id).expect("Failed to find tree");

    let signature =
        Signature::now(TEST_AUTHOR_NAME, TEST_AUTHOR_EMAIL).expect("Failed to create signature");
    let parents: Vec<_> = parent.iter().collect();
    repo.commit(Some(&branch_ref), &signature, &signature, message, &tree, &parents)
        .expect("Failed to commit")
}

/// Creates a remote with one commit holding `files`, pushed from a
/// throwaway workspace.
pub fn seeded_remote(files: &[(&str, &[u8])]) -> TestRemote {
    let remote = TestRemote::new();
    let seed = remote.workspace();
    for (path, bytes) in files {
        seed.write(path, bytes);
    }
    seed.commit_all("seed");
    seed.push();
    remote
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_remote_has_files() {
        let remote = seeded_remote(&[("a.txt", b"hello"), ("dir/b.txt", b"world")]);
        assert_eq!(remote.read("a.txt").unwrap(), b"hello");
        assert_eq!(remote.read("dir/b.txt").unwrap(), b"world");
        assert_eq!(remote.commit_count(), 1);
    }

    #[test]
    fn workspace_commit_and_push() {
        let remote = TestRemote::new();
        let workspace = remote.workspace();
        assert!(workspace.head().is_none());

        workspace.write("a.txt", b"one");
        let first = workspace.commit_all("first");
        workspace.remove("a.txt");
        workspace.write("b.txt", b"two");
        let second = workspace.commit_all("second");
        workspace.push();

        assert_eq!(workspace.head_parents(), vec![first]);
        assert_eq!(remote.head(BRANCH), Some(second));
        assert!(remote.read("a.txt").is_none());
        assert!(workspace.is_clean());
    }

    #[test]
    fn remote_side_commits_and_deletion() {
        let remote = seeded_remote(&[("a.txt", b"hello")]);
        let seed = remote.head(BRANCH).unwrap();

        let next = remote.commit_file("dir/c.txt", b"other client", "remote edit");
        assert_eq!(remote.head(BRANCH), Some(next));
        assert_eq!(remote.read("a.txt").unwrap(), b"hello");
        assert_eq!(remote.read("dir/c.txt").unwrap(), b"other client");
        assert!(remote.contains_commit(seed));
        assert_eq!(remote.commit_count(), 2);

        remote.delete_branch();
        assert_eq!(remote.head(BRANCH), None);
        assert!(!remote.contains_commit(seed));
    }
}
