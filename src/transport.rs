//! HTTP execution boundary.
//!
//! The client describes each call as an [`HttpRequest`] and hands it to a
//! [`Transport`], which returns the status and the fully read body as an
//! [`HttpResponse`]. Reading the whole body inside the transport means the
//! underlying connection is released before the client looks at the status.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use reqwest::Method;
use tracing::debug;
use url::Url;

use crate::error::BoxError;

/// A fully resolved, authenticated request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// Deadline taken from the caller's context, if it had one.
    pub deadline: Option<Instant>,
}

impl HttpRequest {
    /// Time left before the deadline, used as the request timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status < 300
    }
}

/// Something that can send an [`HttpRequest`].
///
/// Implementations must not retry; failures are returned to the caller as-is.
pub trait Transport: fmt::Debug + Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, BoxError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, BoxError> {
        (**self).send(request)
    }
}

/// Default transport backed by a blocking [`reqwest::blocking::Client`].
///
/// Connection pooling, TLS and redirects are whatever the wrapped client is
/// configured to do.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::blocking::Client,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::blocking::Client) -> Self {
        Self { http, timeout: None }
    }

    /// Transport over a fresh reqwest client with no overall timeout.
    ///
    /// reqwest's blocking client times out after 30s unless told otherwise;
    /// here only the caller's context bounds a request.
    pub fn untimed() -> Result<Self, reqwest::Error> {
        let http = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self::new(http))
    }

    /// Cap every request at `timeout`, on top of any context deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn http_client(&self) -> &reqwest::blocking::Client {
        &self.http
    }
}

impl From<reqwest::blocking::Client> for ReqwestTransport {
    fn from(http: reqwest::blocking::Client) -> Self {
        Self::new(http)
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, BoxError> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }
        let timeout = match (request.timeout(), self.timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        // reqwest errors quote the full URL, token included.
        let response = builder.send().map_err(reqwest::Error::without_url)?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(reqwest::Error::without_url)?
            .to_vec();
        debug!(status, bytes = body.len(), "Read response body");

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Records every request and replays queued responses in order.
    /// An empty queue answers `200` with an empty body.
    #[derive(Debug, Default)]
    pub(crate) struct MockTransport {
        requests: Mutex<Vec<HttpRequest>>,
        responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
    }

    impl MockTransport {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn respond(&self, status: u16, body: &str) -> &Self {
            self.responses.lock().unwrap().push_back(Ok(HttpResponse {
                status,
                body: body.as_bytes().to_vec(),
            }));
            self
        }

        pub(crate) fn fail(&self, message: &str) -> &Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(message.to_string()));
            self
        }

        pub(crate) fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Transport for MockTransport {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, BoxError> {
            self.requests.lock().unwrap().push(request.clone());
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(response)) => Ok(response),
                Some(Err(message)) => Err(message.into()),
                None => Ok(HttpResponse {
                    status: 200,
                    body: Vec::new(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    fn request() -> HttpRequest {
        HttpRequest {
            method: Method::GET,
            url: Url::parse("https://circleci.com/api/v1.1/projects").unwrap(),
            headers: HeaderMap::new(),
            body: None,
            deadline: None,
        }
    }

    #[test]
    fn timeout_follows_deadline() {
        let mut req = request();
        assert_eq!(req.timeout(), None);

        req.deadline = Some(Instant::now() - Duration::from_secs(5));
        assert_eq!(req.timeout(), Some(Duration::ZERO));
    }

    #[test]
    fn success_is_below_300() {
        let ok = HttpResponse {
            status: 204,
            body: Vec::new(),
        };
        let redirect = HttpResponse {
            status: 301,
            body: Vec::new(),
        };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
    }

    #[test]
    fn shared_transport_sees_calls() {
        let mock = MockTransport::new();
        mock.respond(201, "{}");
        let shared: Arc<MockTransport> = Arc::clone(&mock);

        let response = shared.send(&request()).unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(mock.calls(), 1);
        assert_eq!(mock.requests()[0].method, Method::GET);
    }

    #[test]
    fn reqwest_transport_exposes_client() {
        let transport = ReqwestTransport::from(reqwest::blocking::Client::new());
        let _client: &reqwest::blocking::Client = transport.http_client();
    }

    #[test]
    fn untimed_transport_has_no_timeout() {
        let transport = ReqwestTransport::untimed().unwrap();
        assert_eq!(transport.timeout(), None);

        let capped = transport.with_timeout(Duration::from_secs(5));
        assert_eq!(capped.timeout(), Some(Duration::from_secs(5)));
    }
}
