//! Phase labels written into the lease by the sync engine.
//!
//! Phases are free-form strings on disk; these are the ones the engine uses.

/// Lease just acquired.
pub const STARTING: &str = "starting";
/// Hashing and staging working-tree changes.
pub const STAGING: &str = "staging";
/// Creating a local commit.
pub const COMMITTING: &str = "committing";
/// Fetching from the remote.
pub const FETCHING: &str = "fetching";
/// Comparing local and remote histories.
pub const ANALYZING: &str = "analyzing";
/// Building a merge commit.
pub const MERGING: &str = "merging";
/// Pushing to the remote.
pub const PUSHING: &str = "pushing";
/// Transferring large-file bytes.
pub const TRANSFERRING: &str = "transferring";
/// Rehydrating large files after checkout.
pub const RECONCILING: &str = "reconciling";
/// Consolidating loose objects.
pub const PACKING: &str = "packing";
