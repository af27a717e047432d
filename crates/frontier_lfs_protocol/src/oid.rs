//! Content-addressed object identifiers.

use crate::error::PointerError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A sha256 object identifier, stored as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Length of the hex representation.
    pub const HEX_LEN: usize = 64;

    /// Hashes `content` and returns its identifier.
    pub fn for_content(content: &[u8]) -> Self {
        let digest = Sha256::digest(content);
        Self(hex::encode(digest))
    }

    /// Returns a streaming hasher whose result can be turned into an id with
    /// [`ObjectId::from_hasher`].
    pub fn hasher() -> Sha256 {
        Sha256::new()
    }

    /// Finishes a hasher started with [`ObjectId::hasher`].
    pub fn from_hasher(hasher: Sha256) -> Self {
        Self(hex::encode(hasher.finalize()))
    }

    /// Returns the hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ObjectId {
    type Err = PointerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == Self::HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(PointerError::InvalidOid(s.to_string()))
        }
    }
}

impl TryFrom<String> for ObjectId {
    type Error = PointerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObjectId> for String {
    fn from(oid: ObjectId) -> Self {
        oid.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        let oid = ObjectId::for_content(b"hello\n");
        assert_eq!(
            oid.as_str(),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[test]
    fn streaming_matches_oneshot() {
        use sha2::Digest;
        let mut hasher = ObjectId::hasher();
        hasher.update(b"hel");
        hasher.update(b"lo\n");
        assert_eq!(
            ObjectId::from_hasher(hasher),
            ObjectId::for_content(b"hello\n")
        );
    }

    #[test]
    fn rejects_uppercase_and_short() {
        let upper = "5891B5B522D5DF086D0FF0B110FBD9D21BB4FC7163AF34D08286A2E846F6BE03";
        assert!(upper.parse::<ObjectId>().is_err());
        assert!("abc".parse::<ObjectId>().is_err());
    }

    #[test]
    fn serde_validates() {
        let ok: Result<ObjectId, _> = serde_json::from_str(&format!("\"{}\"", "a".repeat(64)));
        assert!(ok.is_ok());
        let bad: Result<ObjectId, _> = serde_json::from_str("\"xyz\"");
        assert!(bad.is_err());
    }
}
