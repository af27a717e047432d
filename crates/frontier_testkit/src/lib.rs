//! # Frontier Testkit
//!
//! Test utilities for Frontier sync.
//!
//! This crate provides:
//! - Bare "origin" repositories and working clones built with `git2`
//! - An in-memory large-file batch server behind the `HttpClient` seam
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use frontier_testkit::prelude::*;
//!
//! #[test]
//! fn pushes_to_origin() {
//!     let remote = TestRemote::new();
//!     let workspace = remote.workspace();
//!     workspace.write("a.txt", b"hello");
//!     workspace.commit_all("first");
//!     workspace.push();
//!     assert_eq!(remote.head("main"), workspace.head());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod lfs_server;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::lfs_server::*;
}

pub use fixtures::*;
pub use generators::*;
pub use lfs_server::*;
