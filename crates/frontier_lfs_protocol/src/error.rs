//! Error types for the LFS protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while decoding a pointer record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PointerError {
    /// The pointer file has zero bytes.
    #[error("pointer is empty")]
    Empty,

    /// The pointer is larger than any valid pointer can be.
    #[error("pointer too large: {size} bytes")]
    TooLarge {
        /// Observed size in bytes.
        size: usize,
    },

    /// The pointer is not valid UTF-8 text.
    #[error("pointer is not valid UTF-8")]
    InvalidUtf8,

    /// The first line is not a recognised version line.
    #[error("unsupported pointer version: {0}")]
    UnsupportedVersion(String),

    /// A required key is absent.
    #[error("missing pointer field: {0}")]
    MissingField(&'static str),

    /// A line could not be split into key and value.
    #[error("malformed pointer line: {0}")]
    MalformedLine(String),

    /// The oid is not `sha256:` followed by 64 lowercase hex characters.
    #[error("invalid oid: {0}")]
    InvalidOid(String),

    /// The size is not a non-negative decimal integer.
    #[error("invalid size: {0}")]
    InvalidSize(String),
}

/// Errors at the batch protocol boundary.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Pointer decoding failed.
    #[error(transparent)]
    Pointer(#[from] PointerError),

    /// Batch JSON could not be encoded or decoded.
    #[error("batch payload error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(PointerError::Empty.to_string(), "pointer is empty");
        let err = PointerError::TooLarge { size: 4096 };
        assert!(err.to_string().contains("4096"));

        let err: ProtocolError = PointerError::MissingField("oid").into();
        assert_eq!(err.to_string(), "missing pointer field: oid");
    }
}
