//! # Frontier Sync
//!
//! Keeps a local working copy synchronized with its origin remote.
//!
//! This crate provides:
//! - `SyncContext`: process-wide configuration and collaborators
//! - `SyncEngine`: `sync_changes`, `complete_merge`, `sync_with_retry`
//! - Two-way conflict detection with structured per-file results
//! - Large-file staging and rehydration through `frontier_lfs`
//! - Opportunistic object packing through `frontier_maintenance`
//!
//! ## Sync Algorithm
//!
//! Under the workspace lease, a sync:
//! 1. stages and commits working-tree changes, large files as pointers
//! 2. stops if the remote is unreachable, keeping the local commit
//! 3. fetches the current branch
//! 4. pushes if the remote branch does not exist or is behind
//! 5. fast-forwards if the local branch is behind
//! 6. otherwise compares both sides path by path against the merge base
//!
//! Paths changed on both sides to different content are returned as
//! conflicts and nothing is pushed. Without conflicts the engine resets to
//! the remote when every local change is already there, or commits a merge
//! and pushes it.
//!
//! ## Key Invariants
//!
//! - At most one sync runs per workspace, across processes
//! - The lease is released whatever the outcome
//! - Local commits are never discarded
//! - Identical changes on both sides never conflict
//! - Conflicts are a result, not an error

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod engine;
mod error;
mod git;
mod merge;
mod outcome;
mod probe;

pub use config::{RetryConfig, SyncConfig};
pub use context::SyncContext;
pub use engine::{SyncEngine, SyncStats};
pub use error::{classify_git_error, SyncError, SyncResult};
pub use merge::{analyze, Divergence};
pub use outcome::{
    Author, ConflictedFile, MergeOutcome, Resolution, ResolutionKind, SyncOutcome,
};
pub use probe::{RemoteProbe, StaticProbe, TcpProbe};

pub use frontier_lfs::{Credentials, RepoStrategy, StrategyStore};
