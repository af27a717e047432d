//! Batch API wire types.
//!
//! The server's raw JSON is decoded exactly once into [`BatchResponse`] and
//! then flattened into one [`BatchObjectResult`] per object, so callers never
//! probe optional nested fields themselves.

use crate::error::ProtocolResult;
use crate::oid::ObjectId;
use crate::pointer::Pointer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Path of the batch endpoint relative to the remote URL.
pub const BATCH_PATH: &str = "info/lfs/objects/batch";

/// Media type used for both `Accept` and `Content-Type` on batch calls.
pub const BATCH_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// The only transfer adapter this client speaks.
pub const BASIC_TRANSFER: &str = "basic";

/// Direction of a batch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Client sends bytes to the server.
    Upload,
    /// Client fetches bytes from the server.
    Download,
}

impl Operation {
    /// Returns the wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Upload => "upload",
            Operation::Download => "download",
        }
    }
}

/// One object named in a batch request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectSpec {
    /// Content hash.
    pub oid: ObjectId,
    /// Byte length.
    pub size: u64,
}

impl From<&Pointer> for ObjectSpec {
    fn from(pointer: &Pointer) -> Self {
        Self {
            oid: pointer.oid().clone(),
            size: pointer.size(),
        }
    }
}

/// Body of `POST <remote>/info/lfs/objects/batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Upload or download.
    pub operation: Operation,
    /// Transfer adapters the client supports.
    #[serde(default)]
    pub transfers: Vec<String>,
    /// Objects to negotiate.
    pub objects: Vec<ObjectSpec>,
}

impl BatchRequest {
    /// Creates a request using the basic transfer adapter.
    pub fn new(operation: Operation, objects: Vec<ObjectSpec>) -> Self {
        Self {
            operation,
            transfers: vec![BASIC_TRANSFER.to_string()],
            objects,
        }
    }

    /// Serializes the request body.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A transfer action: where to send or fetch bytes, and with which headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Target URL.
    pub href: String,
    /// Headers to send with the transfer, and only these.
    #[serde(default)]
    pub header: BTreeMap<String, String>,
    /// Optional expiry timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Actions block as it appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawActions {
    /// Upload action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<Action>,
    /// Download action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<Action>,
    /// Verify action, accepted but not used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<Action>,
}

/// Per-object error reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectError {
    /// HTTP-like status code.
    pub code: i64,
    /// Human readable message.
    pub message: String,
}

/// A response object as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBatchObject {
    /// Content hash.
    pub oid: ObjectId,
    /// Byte length.
    pub size: u64,
    /// Whether the server considers the request authenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<bool>,
    /// Transfer actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<RawActions>,
    /// Object-level error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ObjectError>,
}

/// Body returned by the batch endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Transfer adapter chosen by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<String>,
    /// Objects in the response.
    #[serde(default)]
    pub objects: Vec<RawBatchObject>,
}

impl BatchResponse {
    /// Decodes a response body.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serializes the response body.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Flattens the response into one result per object for `operation`.
    ///
    /// An object without the action matching `operation` needs no transfer.
    pub fn into_results(self, operation: Operation) -> Vec<BatchObjectResult> {
        self.objects
            .into_iter()
            .map(|object| BatchObjectResult::from_raw(object, operation))
            .collect()
    }
}

/// Outcome for one object of a batch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchObjectResult {
    /// The server wants the bytes.
    Uploadable {
        /// Object being uploaded.
        object: ObjectSpec,
        /// Where and how to PUT it.
        action: Action,
    },
    /// The server offers the bytes.
    Downloadable {
        /// Object being downloaded.
        object: ObjectSpec,
        /// Where and how to GET it.
        action: Action,
    },
    /// No transfer needed.
    AlreadyPresent {
        /// Object in question.
        object: ObjectSpec,
    },
    /// The server refused this object.
    Errored {
        /// Object in question.
        object: ObjectSpec,
        /// Server-side error.
        error: ObjectError,
    },
}

impl BatchObjectResult {
    fn from_raw(raw: RawBatchObject, operation: Operation) -> Self {
        let object = ObjectSpec {
            oid: raw.oid,
            size: raw.size,
        };
        if let Some(error) = raw.error {
            return Self::Errored { object, error };
        }
        let actions = raw.actions.unwrap_or_default();
        match operation {
            Operation::Upload => match actions.upload {
                Some(action) => Self::Uploadable { object, action },
                None => Self::AlreadyPresent { object },
            },
            Operation::Download => match actions.download {
                Some(action) => Self::Downloadable { object, action },
                None => Self::AlreadyPresent { object },
            },
        }
    }

    /// Returns the object this result is about.
    pub fn object(&self) -> &ObjectSpec {
        match self {
            Self::Uploadable { object, .. }
            | Self::Downloadable { object, .. }
            | Self::AlreadyPresent { object }
            | Self::Errored { object, .. } => object,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(c: char) -> String {
        std::iter::repeat(c).take(64).collect()
    }

    #[test]
    fn request_wire_shape() {
        let request = BatchRequest::new(
            Operation::Upload,
            vec![ObjectSpec {
                oid: oid('a').parse().unwrap(),
                size: 12,
            }],
        );
        let json: serde_json::Value = serde_json::from_slice(&request.to_json().unwrap()).unwrap();
        assert_eq!(json["operation"], "upload");
        assert_eq!(json["transfers"][0], "basic");
        assert_eq!(json["objects"][0]["oid"], oid('a'));
        assert_eq!(json["objects"][0]["size"], 12);
    }

    #[test]
    fn response_flattens_per_shape() {
        let body = format!(
            r#"{{
                "transfer": "basic",
                "objects": [
                    {{"oid": "{a}", "size": 1,
                      "actions": {{"upload": {{"href": "https://up/a", "header": {{"Authorization": "Bearer t"}}}}}}}},
                    {{"oid": "{b}", "size": 2}},
                    {{"oid": "{c}", "size": 3, "error": {{"code": 422, "message": "bad size"}}}}
                ]
            }}"#,
            a = oid('a'),
            b = oid('b'),
            c = oid('c'),
        );
        let results = BatchResponse::decode(body.as_bytes())
            .unwrap()
            .into_results(Operation::Upload);
        assert_eq!(results.len(), 3);

        match &results[0] {
            BatchObjectResult::Uploadable { action, .. } => {
                assert_eq!(action.href, "https://up/a");
                assert_eq!(action.header.get("Authorization").unwrap(), "Bearer t");
            }
            other => panic!("expected uploadable, got {other:?}"),
        }
        assert!(matches!(results[1], BatchObjectResult::AlreadyPresent { .. }));
        match &results[2] {
            BatchObjectResult::Errored { error, object } => {
                assert_eq!(error.code, 422);
                assert_eq!(object.size, 3);
            }
            other => panic!("expected errored, got {other:?}"),
        }
    }

    #[test]
    fn download_ignores_upload_action() {
        let body = format!(
            r#"{{"objects": [{{"oid": "{a}", "size": 1, "actions": {{"upload": {{"href": "https://up"}}}}}}]}}"#,
            a = oid('a')
        );
        let results = BatchResponse::decode(body.as_bytes())
            .unwrap()
            .into_results(Operation::Download);
        assert!(matches!(results[0], BatchObjectResult::AlreadyPresent { .. }));
    }

    #[test]
    fn invalid_oid_rejected_at_boundary() {
        let body = r#"{"objects": [{"oid": "nothex", "size": 1}]}"#;
        assert!(BatchResponse::decode(body.as_bytes()).is_err());
    }
}
