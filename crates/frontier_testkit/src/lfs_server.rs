//! In-memory large-file server.
//!
//! [`MockLfsServer`] implements [`HttpClient`] and answers batch, upload and
//! download requests from a map of stored objects. Every request is
//! recorded so tests can assert on what went over the wire.

use frontier_lfs::{HttpClient, HttpMethod, HttpRequest, HttpResponse, TransportError};
use frontier_lfs_protocol::{
    Action, BatchRequest, BatchResponse, ObjectError, Operation, Pointer, RawActions,
    RawBatchObject,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Batch endpoint the mock answers on.
pub const MOCK_LFS_ENDPOINT: &str = "https://lfs.test/repo.git/info/lfs/objects/batch";

/// Prefix of the per-object transfer URLs handed out in actions.
pub const MOCK_OBJECT_URL: &str = "https://lfs.test/objects/";

/// Header value transfers must carry.
pub const MOCK_TRANSFER_TOKEN: &str = "Bearer upload-token";

/// Callback run on every batch request, before it is answered.
pub type BatchHook = Box<dyn FnMut(Operation) + Send>;

/// An in-memory batch server.
#[derive(Default)]
pub struct MockLfsServer {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    requests: Mutex<Vec<HttpRequest>>,
    unreachable: Mutex<bool>,
    on_batch: Mutex<Option<BatchHook>>,
}

impl std::fmt::Debug for MockLfsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLfsServer")
            .field("objects", &self.objects.lock().len())
            .field("requests", &self.requests.lock().len())
            .field("unreachable", &*self.unreachable.lock())
            .finish_non_exhaustive()
    }
}

impl MockLfsServer {
    /// Creates an empty server.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stores bytes directly and returns their pointer.
    pub fn insert(&self, bytes: &[u8]) -> Pointer {
        let pointer = Pointer::from_content(bytes);
        self.objects
            .lock()
            .insert(pointer.oid().as_str().to_string(), bytes.to_vec());
        pointer
    }

    /// Returns true if the object is stored.
    pub fn contains(&self, pointer: &Pointer) -> bool {
        self.objects.lock().contains_key(pointer.oid().as_str())
    }

    /// Returns the stored bytes of an object.
    pub fn get(&self, pointer: &Pointer) -> Option<Vec<u8>> {
        self.objects.lock().get(pointer.oid().as_str()).cloned()
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Number of batch calls made for `operation`.
    pub fn batch_requests(&self, operation: Operation) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|req| req.method == HttpMethod::Post)
            .filter_map(|req| serde_json::from_slice::<BatchRequest>(&req.body).ok())
            .filter(|batch| batch.operation == operation)
            .count()
    }

    /// Makes every following request fail as if the host were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock() = unreachable;
    }

    /// Runs `hook` on every following batch request. Lets a test act while
    /// an operation is between its fetch and its push.
    pub fn on_batch(&self, hook: impl FnMut(Operation) + Send + 'static) {
        *self.on_batch.lock() = Some(Box::new(hook));
    }

    fn run_hook(&self, request: &HttpRequest) {
        let Ok(batch) = serde_json::from_slice::<BatchRequest>(&request.body) else {
            return;
        };
        let taken = self.on_batch.lock().take();
        if let Some(mut hook) = taken {
            hook(batch.operation);
            self.on_batch.lock().get_or_insert(hook);
        }
    }

    fn batch(&self, request: &HttpRequest) -> HttpResponse {
        if request.url != MOCK_LFS_ENDPOINT {
            return HttpResponse::new(404, Vec::new());
        }
        if request.basic_auth.is_none() {
            return HttpResponse::new(401, Vec::new());
        }
        let Ok(batch) = serde_json::from_slice::<BatchRequest>(&request.body) else {
            return HttpResponse::new(422, Vec::new());
        };

        let objects = self.objects.lock();
        let answers = batch
            .objects
            .into_iter()
            .map(|spec| {
                let stored = objects.contains_key(spec.oid.as_str());
                let action = Action {
                    href: format!("{MOCK_OBJECT_URL}{}", spec.oid.as_str()),
                    header: BTreeMap::from([(
                        "Authorization".to_string(),
                        MOCK_TRANSFER_TOKEN.to_string(),
                    )]),
                    expires_at: None,
                };
                let (actions, error) = match (batch.operation, stored) {
                    (Operation::Upload, true) => (None, None),
                    (Operation::Upload, false) => (
                        Some(RawActions {
                            upload: Some(action),
                            ..RawActions::default()
                        }),
                        None,
                    ),
                    (Operation::Download, true) => (
                        Some(RawActions {
                            download: Some(action),
                            ..RawActions::default()
                        }),
                        None,
                    ),
                    (Operation::Download, false) => (
                        None,
                        Some(ObjectError {
                            code: 404,
                            message: "Object does not exist".to_string(),
                        }),
                    ),
                };
                RawBatchObject {
                    oid: spec.oid,
                    size: spec.size,
                    authenticated: Some(true),
                    actions,
                    error,
                }
            })
            .collect();

        let response = BatchResponse {
            transfer: Some("basic".to_string()),
            objects: answers,
        };
        match response.to_json() {
            Ok(body) => HttpResponse::new(200, body),
            Err(_) => HttpResponse::new(500, Vec::new()),
        }
    }

    fn transfer(&self, request: &HttpRequest) -> HttpResponse {
        let Some(oid) = request.url.strip_prefix(MOCK_OBJECT_URL) else {
            return HttpResponse::new(404, Vec::new());
        };
        let authorized = request.basic_auth.is_none()
            && request.header_value("Authorization") == Some(MOCK_TRANSFER_TOKEN);
        if !authorized {
            return HttpResponse::new(401, Vec::new());
        }
        match request.method {
            HttpMethod::Put => {
                self.objects
                    .lock()
                    .insert(oid.to_string(), request.body.clone());
                HttpResponse::new(200, Vec::new())
            }
            HttpMethod::Get => match self.objects.lock().get(oid) {
                Some(bytes) => HttpResponse::new(200, bytes.clone()),
                None => HttpResponse::new(404, Vec::new()),
            },
            HttpMethod::Post => HttpResponse::new(405, Vec::new()),
        }
    }
}

impl HttpClient for MockLfsServer {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());
        if *self.unreachable.lock() {
            return Err(TransportError::Unreachable("lfs.test".to_string()));
        }
        Ok(match request.method {
            HttpMethod::Post => {
                self.run_hook(&request);
                self.batch(&request)
            }
            HttpMethod::Put | HttpMethod::Get => self.transfer(&request),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontier_lfs::{BatchClient, Credentials};
    use frontier_lfs_protocol::{BatchObjectResult, ObjectSpec};

    fn client(server: &Arc<MockLfsServer>) -> BatchClient {
        BatchClient::new(MOCK_LFS_ENDPOINT, server.clone())
    }

    #[test]
    fn upload_then_download() {
        let server = MockLfsServer::new();
        let pointer = Pointer::from_content(b"big bytes");
        let auth = Credentials::new("user", "token");
        let client = client(&server);

        let results = client
            .batch(Operation::Upload, vec![ObjectSpec::from(&pointer)], &auth)
            .unwrap();
        let BatchObjectResult::Uploadable { action, .. } = &results[0] else {
            panic!("expected an upload action");
        };
        client.upload(action, b"big bytes".to_vec()).unwrap();
        assert!(server.contains(&pointer));

        let results = client
            .batch(Operation::Upload, vec![ObjectSpec::from(&pointer)], &auth)
            .unwrap();
        assert!(matches!(results[0], BatchObjectResult::AlreadyPresent { .. }));

        let results = client
            .batch(Operation::Download, vec![ObjectSpec::from(&pointer)], &auth)
            .unwrap();
        let BatchObjectResult::Downloadable { action, .. } = &results[0] else {
            panic!("expected a download action");
        };
        assert_eq!(client.download(action).unwrap(), b"big bytes");
        assert_eq!(server.batch_requests(Operation::Upload), 2);
        assert_eq!(server.batch_requests(Operation::Download), 1);
    }

    #[test]
    fn missing_object_is_an_object_error() {
        let server = MockLfsServer::new();
        let pointer = Pointer::from_content(b"never uploaded");
        let results = client(&server)
            .batch(
                Operation::Download,
                vec![ObjectSpec::from(&pointer)],
                &Credentials::new("user", "token"),
            )
            .unwrap();
        assert!(matches!(results[0], BatchObjectResult::Errored { .. }));
    }

    #[test]
    fn transfers_reject_basic_auth() {
        let server = MockLfsServer::new();
        let pointer = server.insert(b"stored");
        let request = HttpRequest::new(
            HttpMethod::Get,
            format!("{MOCK_OBJECT_URL}{}", pointer.oid().as_str()),
        )
        .header("Authorization", MOCK_TRANSFER_TOKEN)
        .basic_auth(Credentials::new("user", "token"));
        assert_eq!(server.send(request).unwrap().status, 401);
    }

    #[test]
    fn batch_hook_sees_every_batch() {
        let server = MockLfsServer::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        server.on_batch(move |operation| recorded.lock().push(operation));

        let pointer = server.insert(b"stored");
        let auth = Credentials::new("user", "token");
        let client = client(&server);
        client
            .batch(Operation::Upload, vec![ObjectSpec::from(&pointer)], &auth)
            .unwrap();
        client
            .batch(Operation::Download, vec![ObjectSpec::from(&pointer)], &auth)
            .unwrap();

        assert_eq!(*seen.lock(), vec![Operation::Upload, Operation::Download]);
    }

    #[test]
    fn unreachable_server_fails_at_transport() {
        let server = MockLfsServer::new();
        server.set_unreachable(true);
        let err = client(&server)
            .batch(Operation::Upload, Vec::new(), &Credentials::new("u", "p"))
            .unwrap_err();
        assert!(matches!(
            err,
            frontier_lfs::LfsError::Transport(TransportError::Unreachable(_))
        ));
        assert_eq!(server.requests().len(), 1);
    }
}
