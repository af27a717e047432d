//! # Frontier LFS Protocol
//!
//! Large-file pointer format and batch transfer wire types.
//!
//! This crate provides:
//! - `Pointer` encoding/decoding for the three-line pointer record
//! - `PointerContent` classification of file bytes (pointer, empty, malformed, raw)
//! - Batch API request/response types
//! - `BatchObjectResult`, the tagged view of one batch response object
//!
//! This is a pure protocol crate: no filesystem or network access.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod oid;
mod pointer;

pub use batch::{
    Action, BatchObjectResult, BatchRequest, BatchResponse, ObjectError, ObjectSpec, Operation,
    RawActions, RawBatchObject, BATCH_MEDIA_TYPE, BATCH_PATH, BASIC_TRANSFER,
};
pub use error::{PointerError, ProtocolError, ProtocolResult};
pub use oid::ObjectId;
pub use pointer::{
    Pointer, PointerContent, LEGACY_SPEC_VERSION, MAX_POINTER_SIZE, SPEC_VERSION,
};
