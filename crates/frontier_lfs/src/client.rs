//! Blob transfer client for the batch API.

use crate::error::{LfsError, LfsResult};
use crate::http::{Credentials, HttpClient, HttpMethod, HttpRequest};
use frontier_lfs_protocol::{
    Action, BatchObjectResult, BatchRequest, BatchResponse, ObjectSpec, Operation,
    BATCH_MEDIA_TYPE, BATCH_PATH,
};
use std::sync::Arc;
use tracing::debug;

/// Derives the batch endpoint from a remote URL.
///
/// `https://host/owner/repo.git` becomes
/// `https://host/owner/repo.git/info/lfs/objects/batch`; scp-style
/// `git@host:owner/repo.git` is mapped to the equivalent https URL.
pub fn batch_endpoint(remote_url: &str) -> LfsResult<String> {
    let base = remote_url.trim().trim_end_matches('/');
    let http_base = if base.starts_with("https://") || base.starts_with("http://") {
        base.to_string()
    } else if let Some(rest) = base.strip_prefix("ssh://") {
        let rest = rest.split_once('@').map_or(rest, |(_, host)| host);
        let (host, path) = rest
            .split_once('/')
            .ok_or_else(|| LfsError::NoEndpoint(remote_url.to_string()))?;
        let host = host.split(':').next().unwrap_or(host);
        format!("https://{host}/{path}")
    } else if let Some((user_host, path)) = base.split_once(':').filter(|(h, _)| h.contains('@')) {
        let host = user_host.split_once('@').map_or(user_host, |(_, h)| h);
        format!("https://{host}/{}", path.trim_start_matches('/'))
    } else {
        return Err(LfsError::NoEndpoint(remote_url.to_string()));
    };
    Ok(format!("{http_base}/{BATCH_PATH}"))
}

/// Talks to one batch endpoint.
///
/// Basic authentication is sent only on the batch call. Uploads and
/// downloads carry exactly the headers the server put in the action.
#[derive(Clone)]
pub struct BatchClient {
    endpoint: String,
    http: Arc<dyn HttpClient>,
}

impl BatchClient {
    /// Creates a client for `endpoint`.
    pub fn new(endpoint: impl Into<String>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }

    /// Returns the batch endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Negotiates a batch of objects.
    ///
    /// # Errors
    ///
    /// Any transport, status or payload failure is fatal for the call.
    pub fn batch(
        &self,
        operation: Operation,
        objects: Vec<ObjectSpec>,
        auth: &Credentials,
    ) -> LfsResult<Vec<BatchObjectResult>> {
        let count = objects.len();
        let body = BatchRequest::new(operation, objects).to_json()?;
        let request = HttpRequest::new(HttpMethod::Post, &self.endpoint)
            .header("Accept", BATCH_MEDIA_TYPE)
            .header("Content-Type", BATCH_MEDIA_TYPE)
            .basic_auth(auth.clone())
            .body(body);

        let response = self.http.send(request)?;
        if !response.is_success() {
            return Err(LfsError::from_status(response.status, &self.endpoint));
        }
        let results = BatchResponse::decode(&response.body)?.into_results(operation);
        debug!(
            operation = operation.as_str(),
            requested = count,
            returned = results.len(),
            "batch negotiated"
        );
        Ok(results)
    }

    /// Uploads bytes according to an upload action.
    pub fn upload(&self, action: &Action, bytes: Vec<u8>) -> LfsResult<()> {
        let request = action_request(HttpMethod::Put, action).body(bytes);
        let response = self.http.send(request)?;
        if !response.is_success() {
            return Err(LfsError::from_status(response.status, &action.href));
        }
        Ok(())
    }

    /// Downloads bytes according to a download action.
    pub fn download(&self, action: &Action) -> LfsResult<Vec<u8>> {
        let response = self.http.send(action_request(HttpMethod::Get, action))?;
        if !response.is_success() {
            return Err(LfsError::from_status(response.status, &action.href));
        }
        Ok(response.body)
    }
}

fn action_request(method: HttpMethod, action: &Action) -> HttpRequest {
    action
        .header
        .iter()
        .fold(HttpRequest::new(method, &action.href), |req, (k, v)| {
            req.header(k, v)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, TransportError};
    use frontier_lfs_protocol::Pointer;
    use parking_lot::Mutex;

    struct TestClient {
        responses: Mutex<Vec<HttpResponse>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl TestClient {
        fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl HttpClient for TestClient {
        fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().push(request);
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                return Err(TransportError::Unreachable("no response queued".into()));
            }
            Ok(responses.remove(0))
        }
    }

    #[test]
    fn endpoints() {
        assert_eq!(
            batch_endpoint("https://git.example.com/team/repo.git").unwrap(),
            "https://git.example.com/team/repo.git/info/lfs/objects/batch"
        );
        assert_eq!(
            batch_endpoint("https://git.example.com/team/repo/").unwrap(),
            "https://git.example.com/team/repo/info/lfs/objects/batch"
        );
        assert_eq!(
            batch_endpoint("git@git.example.com:team/repo.git").unwrap(),
            "https://git.example.com/team/repo.git/info/lfs/objects/batch"
        );
        assert_eq!(
            batch_endpoint("ssh://git@git.example.com:22/team/repo.git").unwrap(),
            "https://git.example.com/team/repo.git/info/lfs/objects/batch"
        );
        assert!(batch_endpoint("/srv/repos/repo.git").is_err());
    }

    #[test]
    fn batch_uses_basic_auth_and_upload_does_not() {
        let pointer = Pointer::from_content(b"payload");
        let body = format!(
            r#"{{"objects":[{{"oid":"{}","size":7,"actions":{{"upload":{{"href":"https://store/obj","header":{{"Authorization":"Bearer scoped"}}}}}}}}]}}"#,
            pointer.oid()
        );
        let http = TestClient::new(vec![
            HttpResponse::new(200, body.into_bytes()),
            HttpResponse::new(200, Vec::new()),
        ]);
        let client = BatchClient::new("https://h/r.git/info/lfs/objects/batch", http.clone());

        let results = client
            .batch(
                Operation::Upload,
                vec![ObjectSpec::from(&pointer)],
                &Credentials::new("u", "p"),
            )
            .unwrap();
        let BatchObjectResult::Uploadable { action, .. } = &results[0] else {
            panic!("expected uploadable");
        };
        client.upload(action, b"payload".to_vec()).unwrap();

        let seen = http.seen.lock();
        assert_eq!(seen[0].method, HttpMethod::Post);
        assert_eq!(seen[0].header_value("Accept"), Some(BATCH_MEDIA_TYPE));
        assert!(seen[0].basic_auth.is_some());

        assert_eq!(seen[1].method, HttpMethod::Put);
        assert_eq!(seen[1].url, "https://store/obj");
        assert!(seen[1].basic_auth.is_none());
        assert_eq!(
            seen[1].headers,
            vec![("Authorization".to_string(), "Bearer scoped".to_string())]
        );
        assert_eq!(seen[1].body, b"payload");
    }

    #[test]
    fn status_errors() {
        let http = TestClient::new(vec![HttpResponse::new(401, Vec::new())]);
        let client = BatchClient::new("https://h/b", http);
        let err = client
            .batch(Operation::Download, Vec::new(), &Credentials::new("u", "p"))
            .unwrap_err();
        assert!(matches!(err, LfsError::AuthenticationFailed));
    }

    #[test]
    fn transport_failure_is_fatal() {
        let http = TestClient::new(Vec::new());
        let client = BatchClient::new("https://h/b", http);
        let err = client
            .batch(Operation::Upload, Vec::new(), &Credentials::new("u", "p"))
            .unwrap_err();
        assert!(matches!(err, LfsError::Transport(TransportError::Unreachable(_))));
    }
}
