//! HTTP transport abstraction.
//!
//! The dispatcher talks to the network through [`HttpTransport`], so
//! connection pooling, DNS and TLS stay behind one seam. [`ReqwestTransport`]
//! is the production implementation; tests substitute an in-memory one.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt};
use http::{HeaderMap, Method, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{OosError, OosResult};

/// A boxed async byte source.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Stream of response body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = OosResult<Bytes>> + Send>>;

/// Body of an outgoing request.
pub enum RequestBody {
    /// No body.
    Empty,
    /// In-memory body.
    Bytes(Bytes),
    /// Streamed body of optionally known length.
    Stream {
        /// Body source.
        reader: BoxedReader,
        /// Length in bytes, when known.
        len: Option<u64>,
    },
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Stream { len, .. } => f.debug_struct("Stream").field("len", len).finish(),
        }
    }
}

impl RequestBody {
    /// Read the whole body into memory.
    pub async fn collect(self) -> OosResult<Bytes> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Bytes(b) => Ok(b),
            Self::Stream { reader, .. } => {
                let chunks: Vec<Bytes> = ReaderStream::new(reader).try_collect().await?;
                Ok(Bytes::from(chunks.concat()))
            }
        }
    }
}

/// A fully prepared, signed request.
#[derive(Debug)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL, query included.
    pub url: String,
    /// Every request header.
    pub headers: HeaderMap,
    /// Request body.
    pub body: RequestBody,
}

/// Body of a response, consumed as a stream.
pub struct ResponseBody(ByteStream);

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseBody")
    }
}

impl ResponseBody {
    /// Wrap a chunk stream.
    #[must_use]
    pub fn new(stream: ByteStream) -> Self {
        Self(stream)
    }

    /// A body made of one in-memory buffer.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self(Box::pin(futures::stream::once(async move { Ok(bytes) })))
    }

    /// An empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self(Box::pin(futures::stream::empty()))
    }

    /// The underlying chunk stream.
    #[must_use]
    pub fn into_stream(self) -> ByteStream {
        self.0
    }

    /// Read the whole body into memory.
    pub async fn collect(mut self) -> OosResult<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.0.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Copy the body into `writer`, returning the number of bytes written.
    pub async fn write_to<W: AsyncWrite + Unpin>(mut self, writer: &mut W) -> OosResult<u64> {
        let mut written = 0u64;
        while let Some(chunk) = self.0.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(written)
    }
}

/// A raw HTTP response.
#[derive(Debug)]
pub struct HttpResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Unconsumed body.
    pub body: ResponseBody,
}

impl HttpResponse {
    /// Value of a response header as a string, if present and valid.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Sends prepared requests.
#[async_trait]
pub trait HttpTransport: Send + Sync + fmt::Debug {
    /// Perform one HTTP exchange. Non-2xx statuses are returned as responses,
    /// not errors.
    async fn send(&self, request: HttpRequest) -> OosResult<HttpResponse>;
}

/// [`HttpTransport`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport honoring the configured timeouts.
    pub fn new(config: &ClientConfig) -> OosResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_write_timeout())
            .build()
            .map_err(OosError::transport)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> OosResult<HttpResponse> {
        let body = match request.body {
            RequestBody::Empty => reqwest::Body::from(Bytes::new()),
            RequestBody::Bytes(bytes) => reqwest::Body::from(bytes),
            RequestBody::Stream { reader, .. } => {
                reqwest::Body::wrap_stream(ReaderStream::new(reader))
            }
        };

        let response = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(body)
            .send()
            .await
            .map_err(OosError::transport)?;

        let status = response.status();
        let headers = response.headers().clone();
        debug!(status = status.as_u16(), url = %request.url, "received response");

        let stream = response.bytes_stream().map_err(OosError::transport);
        Ok(HttpResponse {
            status,
            headers,
            body: ResponseBody::new(Box::pin(stream)),
        })
    }
}
