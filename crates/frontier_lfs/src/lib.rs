//! # Frontier LFS
//!
//! Large-file support for workspace synchronization.
//!
//! Tracked large files are committed as small pointer records. Their real
//! bytes live next to the pointers in an untracked side directory and move
//! through the batch transfer API:
//!
//! ```text
//! .project/attachments/pointers/img/cat.png   # pointer, committed
//! .project/attachments/files/img/cat.png      # bytes, never committed
//! .project/attachments/corrupted/img/cat.png  # quarantined pointer
//! ```
//!
//! This crate provides:
//! - `LargeFiles`: staging with pointer substitution and upload, and
//!   reconciliation of committed pointers per media strategy
//! - `BatchClient`: the batch API and action-scoped blob transfers
//! - `HttpClient`: the transport seam, with a `reqwest` implementation
//! - `TrackedPaths`: tracked-path rules from config and `.gitattributes`
//! - `StrategyStore`: the persisted per-workspace `RepoStrategy`
//!
//! ## Key Invariants
//!
//! - Bytes already present in the files directory are never overwritten
//! - No pointer is rewritten before the upload batch was negotiated
//! - A corrupted pointer never fails staging; it is recovered or quarantined
//! - `stream-only` workspaces never make a network call during reconciliation

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod http;
mod large_files;
mod layout;
mod reconcile;
mod stage;
mod strategy;
mod tracking;

pub use client::{batch_endpoint, BatchClient};
pub use config::{LfsConfig, DEFAULT_TRACKED_PATTERN};
pub use error::{LfsError, LfsResult};
pub use http::{
    Credentials, HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestClient, TransportError,
};
pub use large_files::{LargeFiles, TransferFailure, TransferProgress, ORIGIN};
pub use layout::{repo_path, slash_path, LargeFileLayout};
pub use reconcile::ReconcileReport;
pub use stage::{worktree_changes, ChangeKind, Quarantined, StageReport, WorktreeChange};
pub use strategy::{RepoStrategy, StrategyStore};
pub use tracking::{lfs_patterns, TrackedPaths};
