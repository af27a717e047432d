//! # Frontier Maintenance
//!
//! Keeps a workspace's object database compact.
//!
//! This crate provides:
//! - `pack_objects`: consolidate every object into a single pack/index pair
//! - `cleanup_orphaned_packs`: remove half-written or unpaired pack artifacts
//! - `count_loose_objects`: cheap trigger for opportunistic packing
//!
//! ## Invariants
//!
//! - A loose object is deleted only if it was enumerated before the new pack
//!   was written, so it is provably stored in that pack
//! - Previous packs are removed only after the new pack is committed
//! - Cleanup tolerates a missing or empty pack directory

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cleanup;
mod error;
mod objects;
mod pack;

pub use cleanup::{cleanup_orphaned_packs, CleanupReport, TEMP_PREFIX};
pub use error::{MaintenanceError, MaintenanceResult};
pub use objects::{count_loose_objects, objects_dir, pack_dir, pack_pairs};
pub use pack::{pack_objects, PackConfig, PackReport, Packer};
