//! In-memory transport used by unit tests.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use parking_lot::Mutex;

use crate::config::ClientConfig;
use crate::error::OosResult;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, ResponseBody};

/// A V4 configuration whose scope is inferred as `cn`/`s3`.
pub(crate) fn test_config() -> ClientConfig {
    ClientConfig::builder()
        .endpoint("http://oos-cn.ctyunapi.cn".into())
        .access_key_id("ak".into())
        .secret_access_key("sk".into())
        .build()
}

/// A request as seen by the mock, body collected.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of a query parameter of the URL, `Some("")` for bare keys.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let (_, query) = self.url.split_once('?')?;
        query.split('&').find_map(|pair| match pair.split_once('=') {
            Some((k, v)) if k == name => Some(v.to_owned()),
            None if pair == name => Some(String::new()),
            _ => None,
        })
    }

    /// URL path without the scheme, host or query.
    pub fn path(&self) -> &str {
        let without_scheme = self.url.split_once("://").map_or(self.url.as_str(), |(_, r)| r);
        let path_and_query = without_scheme
            .find('/')
            .map_or("/", |idx| &without_scheme[idx..]);
        path_and_query.split('?').next().unwrap_or("/")
    }
}

/// A canned response.
#[derive(Debug, Clone)]
pub(crate) struct MockResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl MockResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

type Handler = dyn Fn(&RecordedRequest) -> OosResult<MockResponse> + Send + Sync;

/// Transport answering every request through a handler closure.
pub(crate) struct MockTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("requests", &self.requests.lock().len())
            .finish()
    }
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&RecordedRequest) -> OosResult<MockResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answer `200 OK` with an empty body to everything.
    pub fn ok() -> Arc<Self> {
        Self::new(|_| Ok(MockResponse::ok()))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> OosResult<HttpResponse> {
        let recorded = RecordedRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body: request.body.collect().await?,
        };
        let response = (self.handler)(&recorded);
        self.requests.lock().push(recorded);
        let response = response?;
        Ok(HttpResponse {
            status: response.status,
            headers: response.headers,
            body: ResponseBody::from_bytes(response.body),
        })
    }
}
