//! The pointer record that stands in for large file content.
//!
//! ```text
//! version https://git-lfs.github.com/spec/v1
//! oid sha256:<64 lowercase hex>
//! size <decimal byte length>
//! ```
//!
//! Encoding always produces the canonical version URI with LF line endings.
//! Decoding also accepts the legacy hawser URI, CRLF endings and extra
//! keys after the version line.

use crate::error::PointerError;
use crate::oid::ObjectId;
use sha2::Digest;
use std::fmt;
use std::io::{self, Read};

/// Version URI written into every pointer.
pub const SPEC_VERSION: &str = "https://git-lfs.github.com/spec/v1";

/// Version URI used by early pointer writers.
pub const LEGACY_SPEC_VERSION: &str = "https://hawser.github.com/spec/v1";

/// Upper bound on the size of a pointer file.
///
/// Anything larger is treated as raw content.
pub const MAX_POINTER_SIZE: usize = 1024;

const OID_PREFIX: &str = "sha256:";

/// A decoded pointer record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pointer {
    oid: ObjectId,
    size: u64,
}

impl Pointer {
    /// Creates a pointer from its parts.
    pub fn new(oid: ObjectId, size: u64) -> Self {
        Self { oid, size }
    }

    /// Builds the pointer describing `content`.
    pub fn from_content(content: &[u8]) -> Self {
        Self {
            oid: ObjectId::for_content(content),
            size: content.len() as u64,
        }
    }

    /// Builds the pointer describing everything `reader` yields, without
    /// holding the content in memory.
    pub fn from_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = ObjectId::hasher();
        let mut buf = [0u8; 64 * 1024];
        let mut size = 0u64;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        Ok(Self {
            oid: ObjectId::from_hasher(hasher),
            size,
        })
    }

    /// Returns the object identifier.
    pub fn oid(&self) -> &ObjectId {
        &self.oid
    }

    /// Returns the declared byte length.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the version URI this pointer is written with.
    pub fn spec_version(&self) -> &'static str {
        SPEC_VERSION
    }

    /// Returns true if `content` hashes to this pointer's oid and size.
    pub fn matches(&self, content: &[u8]) -> bool {
        content.len() as u64 == self.size && ObjectId::for_content(content) == self.oid
    }

    /// Encodes the pointer to its canonical text form.
    pub fn encode(&self) -> String {
        format!(
            "version {}\noid {}{}\nsize {}\n",
            SPEC_VERSION, OID_PREFIX, self.oid, self.size
        )
    }

    /// Decodes a pointer from raw bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, PointerError> {
        if bytes.is_empty() {
            return Err(PointerError::Empty);
        }
        if bytes.len() > MAX_POINTER_SIZE {
            return Err(PointerError::TooLarge { size: bytes.len() });
        }
        let text = std::str::from_utf8(bytes).map_err(|_| PointerError::InvalidUtf8)?;

        let mut lines = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.is_empty());

        let version_line = lines.next().ok_or(PointerError::MissingField("version"))?;
        let version = version_line
            .strip_prefix("version ")
            .ok_or_else(|| PointerError::UnsupportedVersion(version_line.to_string()))?;
        if version != SPEC_VERSION && version != LEGACY_SPEC_VERSION {
            return Err(PointerError::UnsupportedVersion(version.to_string()));
        }

        let mut oid = None;
        let mut size = None;
        for line in lines {
            let (key, value) = line
                .split_once(' ')
                .ok_or_else(|| PointerError::MalformedLine(line.to_string()))?;
            match key {
                "oid" => {
                    let hex = value
                        .strip_prefix(OID_PREFIX)
                        .ok_or_else(|| PointerError::InvalidOid(value.to_string()))?;
                    oid = Some(hex.parse::<ObjectId>()?);
                }
                "size" => {
                    let parsed = value
                        .parse::<u64>()
                        .map_err(|_| PointerError::InvalidSize(value.to_string()))?;
                    size = Some(parsed);
                }
                // Extension keys are carried by some writers; they do not
                // change the identity of the content.
                _ => {}
            }
        }

        Ok(Self {
            oid: oid.ok_or(PointerError::MissingField("oid"))?,
            size: size.ok_or(PointerError::MissingField("size"))?,
        })
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// What a tracked file currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerContent {
    /// A well-formed, non-empty pointer.
    Pointer(Pointer),
    /// Zero bytes. Never a valid pointer.
    Empty,
    /// Text that starts like a pointer but does not decode.
    Malformed(PointerError),
    /// Anything else: the real bytes of a large file.
    Raw,
}

impl PointerContent {
    /// Classifies file content.
    pub fn classify(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::Empty;
        }
        if bytes.len() > MAX_POINTER_SIZE || !bytes.starts_with(b"version ") {
            return Self::Raw;
        }
        match Pointer::decode(bytes) {
            Ok(pointer) => Self::Pointer(pointer),
            Err(err) => Self::Malformed(err),
        }
    }

    /// Returns true for empty or malformed content.
    pub fn is_corrupted(&self) -> bool {
        matches!(self, Self::Empty | Self::Malformed(_))
    }
}
