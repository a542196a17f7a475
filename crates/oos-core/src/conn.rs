//! Request dispatcher.
//!
//! [`Conn`] turns an [`OosRequest`] into a signed HTTP exchange:
//!
//! ```text
//! OosRequest
//!    |  body::prepare (Content-Length, Content-MD5, x-amz-content-sha256)
//!    v
//! headers (date, Host, User-Agent, security token, caller headers)
//!    |  Signer::sign
//!    v
//! HttpTransport::send
//!    |  response::classify
//!    v
//! HttpResponse | OosError
//! ```

use std::sync::Arc;

use chrono::Utc;
use http::header::{CONTENT_LENGTH, HOST, HeaderName, HeaderValue, USER_AGENT};
use http::{HeaderMap, Method, Uri};
use oos_auth::canonical::build_url_query_string;
use oos_auth::sigv2::CONTENT_MD5;
use oos_auth::sigv4::X_AMZ_CONTENT_SHA256;
use oos_auth::{
    Credentials, EMPTY_PAYLOAD_SHA256, QueryParams, SignableRequest, Signer, SigningScope,
    UNSIGNED_PAYLOAD,
};
use tracing::debug;

use crate::body::{self, HashPlan, Payload};
use crate::config::{ClientConfig, SignatureVersion};
use crate::endpoint::Endpoint;
use crate::error::{OosError, OosResult};
use crate::response;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Header carrying the temporary security token.
pub const X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";

/// Query parameter carrying the security token on presigned URLs.
pub const PARAM_SECURITY_TOKEN: &str = "security-token";

/// A request before signing.
#[derive(Debug)]
pub struct OosRequest {
    /// HTTP method.
    pub method: Method,
    /// Bucket name, empty for service-level requests.
    pub bucket: String,
    /// Object key, empty for bucket-level requests.
    pub key: String,
    /// Query parameters; `None` values are bare keys such as `uploads`.
    pub params: QueryParams,
    /// Caller headers; they override every header the dispatcher sets.
    pub headers: HeaderMap,
    /// Request body.
    pub payload: Payload,
}

impl OosRequest {
    /// A body-less request without parameters.
    pub fn new(method: Method, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            method,
            bucket: bucket.into(),
            key: key.into(),
            params: QueryParams::new(),
            headers: HeaderMap::new(),
            payload: Payload::Empty,
        }
    }

    /// Add a `key=value` query parameter.
    #[must_use]
    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.insert(key.to_owned(), Some(value.into()));
        self
    }

    /// Add a bare query parameter.
    #[must_use]
    pub fn with_flag(mut self, key: &str) -> Self {
        self.params.insert(key.to_owned(), None);
        self
    }

    /// Merge caller headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in &headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Set one header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = payload.into();
        self
    }
}

/// Signs and sends requests for one client.
#[derive(Debug)]
pub struct Conn {
    endpoint: Endpoint,
    signer: Signer,
    credentials: Credentials,
    user_agent: HeaderValue,
    enable_sha256: bool,
    md5_threshold: u64,
    sha256_threshold: u64,
    transport: Arc<dyn HttpTransport>,
}

impl Conn {
    /// Validate the configuration and resolve the signing mode.
    ///
    /// V4 clients resolve their scope here, so an endpoint whose region or
    /// service cannot be determined fails construction.
    pub fn new(config: &ClientConfig, transport: Arc<dyn HttpTransport>) -> OosResult<Self> {
        config.validate()?;
        let endpoint = Endpoint::parse(&config.endpoint, config.use_cname)?;
        let signer = match config.signature_version {
            SignatureVersion::V2 => Signer::Legacy,
            SignatureVersion::V4 => Signer::V4(SigningScope::resolve(
                config.region.as_deref(),
                config.service.as_deref(),
                endpoint.netloc(),
            )?),
        };
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|_| OosError::InvalidConfig(format!("invalid user agent: {:?}", config.user_agent)))?;

        debug!(
            endpoint = %endpoint.netloc(),
            v4 = signer.is_v4(),
            "created connection"
        );

        Ok(Self {
            endpoint,
            signer,
            credentials: config.credentials(),
            user_agent,
            enable_sha256: config.enable_sha256,
            md5_threshold: config.md5_threshold,
            sha256_threshold: config.sha256_threshold,
            transport,
        })
    }

    /// Digests to compute for a payload. Buffering is bounded by the smaller
    /// threshold of the digests in play.
    fn hash_plan(&self, md5: bool, sha256: bool) -> HashPlan {
        let memory_threshold = match (md5, sha256) {
            (true, true) => self.md5_threshold.min(self.sha256_threshold),
            (false, true) => self.sha256_threshold,
            _ => self.md5_threshold,
        };
        HashPlan {
            md5,
            sha256,
            memory_threshold,
        }
    }

    /// The parsed endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The signing mode.
    #[must_use]
    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Sign and send a request, then classify the response.
    pub async fn execute(&self, request: OosRequest) -> OosResult<HttpResponse> {
        let OosRequest {
            method,
            bucket,
            key,
            params,
            headers: caller_headers,
            payload,
        } = request;

        let md5 = !payload.is_empty() && !caller_headers.contains_key(CONTENT_MD5);
        let sha256 = self.signer.is_v4()
            && self.enable_sha256
            && !payload.is_empty()
            && !caller_headers.contains_key(X_AMZ_CONTENT_SHA256);
        let prepared = body::prepare(payload, self.hash_plan(md5, sha256)).await?;

        let mut headers = HeaderMap::new();
        if let Some(len) = prepared.content_length {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        }
        if let Some(md5) = &prepared.content_md5 {
            headers.insert(HeaderName::from_static(CONTENT_MD5), header_value(md5)?);
        }
        if self.signer.is_v4() && !caller_headers.contains_key(X_AMZ_CONTENT_SHA256) {
            let payload_hash = match &prepared.content_sha256 {
                Some(hash) => hash.as_str(),
                None if !self.enable_sha256 => UNSIGNED_PAYLOAD,
                None => EMPTY_PAYLOAD_SHA256,
            };
            headers.insert(
                HeaderName::from_static(X_AMZ_CONTENT_SHA256),
                header_value(payload_hash)?,
            );
        }

        let now = Utc::now();
        self.signer.stamp(&mut headers, now);
        headers.insert(HOST, header_value(self.endpoint.netloc())?);
        headers.insert(USER_AGENT, self.user_agent.clone());
        if let Some(token) = self.credentials.security_token() {
            headers.insert(HeaderName::from_static(X_AMZ_SECURITY_TOKEN), header_value(token)?);
        }
        for (name, value) in &caller_headers {
            headers.insert(name.clone(), value.clone());
        }

        let mut signable = SignableRequest::new(method.as_str(), &bucket, &key, &params, &mut headers);
        self.signer.sign(&mut signable, &self.credentials, now)?;

        let url = self
            .endpoint
            .url(&bucket, &key, &build_url_query_string(&params));
        debug!(method = %method, url = %url, "dispatching request");

        let response = self
            .transport
            .send(HttpRequest {
                method,
                url,
                headers,
                body: prepared.body,
            })
            .await?;
        response::classify(response).await
    }

    /// Send a request to an already presigned URL.
    ///
    /// The URL carries its own authorization, so nothing is signed and no
    /// payload SHA-256 is attached; `Content-MD5` is still computed.
    pub async fn execute_url(
        &self,
        method: Method,
        signed_url: &str,
        caller_headers: HeaderMap,
        payload: Payload,
    ) -> OosResult<HttpResponse> {
        let uri: Uri = signed_url
            .parse()
            .map_err(|e| OosError::InvalidParameter(format!("invalid signed URL: {e}")))?;
        let host = uri
            .authority()
            .map(|authority| authority.as_str().to_owned())
            .ok_or_else(|| OosError::InvalidParameter("signed URL has no host".to_owned()))?;

        let md5 = !payload.is_empty() && !caller_headers.contains_key(CONTENT_MD5);
        let prepared = body::prepare(payload, self.hash_plan(md5, false)).await?;

        let mut headers = HeaderMap::new();
        if let Some(len) = prepared.content_length {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        }
        if let Some(md5) = &prepared.content_md5 {
            headers.insert(HeaderName::from_static(CONTENT_MD5), header_value(md5)?);
        }
        headers.insert(HOST, header_value(&host)?);
        headers.insert(USER_AGENT, self.user_agent.clone());
        for (name, value) in &caller_headers {
            headers.insert(name.clone(), value.clone());
        }

        debug!(method = %method, host = %host, "dispatching presigned request");
        let response = self
            .transport
            .send(HttpRequest {
                method,
                url: signed_url.to_owned(),
                headers,
                body: prepared.body,
            })
            .await?;
        response::classify(response).await
    }

    /// Build a presigned URL valid for `expires_in_secs` seconds.
    ///
    /// `headers` are the headers the eventual request will carry; the ones
    /// covered by the signing scheme must be sent unchanged.
    pub fn sign_url(
        &self,
        method: &Method,
        bucket: &str,
        key: &str,
        expires_in_secs: u64,
        mut params: QueryParams,
        caller_headers: &HeaderMap,
    ) -> OosResult<String> {
        if let Some(token) = self.credentials.security_token() {
            params.insert(PARAM_SECURITY_TOKEN.to_owned(), Some(token.to_owned()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(HOST, header_value(self.endpoint.netloc())?);
        headers.insert(USER_AGENT, self.user_agent.clone());
        for (name, value) in caller_headers {
            headers.insert(name.clone(), value.clone());
        }

        self.signer.presign(
            method.as_str(),
            bucket,
            key,
            &mut params,
            &headers,
            &self.credentials,
            Utc::now(),
            expires_in_secs,
        );

        Ok(self
            .endpoint
            .url(bucket, key, &build_url_query_string(&params)))
    }
}

fn header_value(value: &str) -> OosResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| OosError::InvalidParameter(format!("invalid header value: {value:?}")))
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use http::header::{AUTHORIZATION, DATE};
    use oos_auth::sigv4::X_AMZ_DATE;

    use super::*;
    use crate::test_support::{MockResponse, MockTransport, test_config};

    fn conn(config: &ClientConfig, transport: &Arc<MockTransport>) -> Conn {
        Conn::new(config, transport.clone()).unwrap()
    }

    #[test]
    fn test_should_bound_buffering_by_smaller_threshold() {
        let mut config = test_config();
        config.md5_threshold = 8 * 1024;
        config.sha256_threshold = 1024;
        let both = conn(&config, &MockTransport::ok());

        assert_eq!(both.hash_plan(true, true).memory_threshold, 1024);
        assert_eq!(both.hash_plan(false, true).memory_threshold, 1024);
        assert_eq!(both.hash_plan(true, false).memory_threshold, 8 * 1024);

        config.md5_threshold = 512;
        let smaller_md5 = conn(&config, &MockTransport::ok());
        assert_eq!(smaller_md5.hash_plan(true, true).memory_threshold, 512);
    }

    #[tokio::test]
    async fn test_should_sign_v4_request_with_payload_hashes() {
        let transport = MockTransport::ok();
        let conn = conn(&test_config(), &transport);

        let request = OosRequest::new(Method::PUT, "bucket", "dir/a b.txt")
            .with_payload(b"hello".to_vec());
        conn.execute(request).await.unwrap();

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        let req = &sent[0];
        assert_eq!(req.url, "http://oos-cn.ctyunapi.cn/bucket/dir/a%20b.txt");
        assert_eq!(req.header("content-length"), Some("5"));
        assert_eq!(req.header("content-md5"), Some("XUFAKrxLKna5cZ2REBfFkg=="));
        assert_eq!(
            req.header(X_AMZ_CONTENT_SHA256),
            Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );
        assert_eq!(req.header("host"), Some("oos-cn.ctyunapi.cn"));
        assert!(req.header(X_AMZ_DATE).is_some());
        assert!(req.header("date").is_none());
        let auth = req.header("authorization").unwrap();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=ak/"));
        assert!(auth.contains("/cn/s3/aws4_request"));
        assert_eq!(req.body.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_should_use_empty_payload_hash_without_body() {
        let transport = MockTransport::ok();
        let conn = conn(&test_config(), &transport);

        conn.execute(OosRequest::new(Method::GET, "bucket", "k"))
            .await
            .unwrap();

        let req = &transport.requests()[0];
        assert_eq!(req.header(X_AMZ_CONTENT_SHA256), Some(EMPTY_PAYLOAD_SHA256));
        assert!(req.header("content-md5").is_none());
    }

    #[tokio::test]
    async fn test_should_send_unsigned_payload_when_hashing_disabled() {
        let transport = MockTransport::ok();
        let mut config = test_config();
        config.enable_sha256 = false;
        let conn = conn(&config, &transport);

        conn.execute(OosRequest::new(Method::PUT, "bucket", "k").with_payload(b"x".to_vec()))
            .await
            .unwrap();

        let req = &transport.requests()[0];
        assert_eq!(req.header(X_AMZ_CONTENT_SHA256), Some(UNSIGNED_PAYLOAD));
        assert!(req.header("content-md5").is_some());
    }

    #[tokio::test]
    async fn test_should_sign_legacy_request_with_date_header() {
        let transport = MockTransport::ok();
        let mut config = test_config();
        config.signature_version = SignatureVersion::V2;
        config.security_token = Some("tok".to_owned());
        let conn = conn(&config, &transport);

        conn.execute(OosRequest::new(Method::POST, "bucket", "k").with_flag("uploads"))
            .await
            .unwrap();

        let req = &transport.requests()[0];
        assert_eq!(req.url, "http://oos-cn.ctyunapi.cn/bucket/k?uploads");
        assert!(req.header(DATE.as_str()).is_some());
        assert!(req.header(X_AMZ_DATE).is_none());
        assert!(req.header(X_AMZ_CONTENT_SHA256).is_none());
        assert_eq!(req.header(X_AMZ_SECURITY_TOKEN), Some("tok"));
        assert!(req.header(AUTHORIZATION.as_str()).unwrap().starts_with("AWS ak:"));
    }

    #[tokio::test]
    async fn test_should_let_caller_headers_override_defaults() {
        let transport = MockTransport::ok();
        let conn = conn(&test_config(), &transport);

        let request = OosRequest::new(Method::PUT, "bucket", "k")
            .with_header(HeaderName::from_static("content-md5"), HeaderValue::from_static("given"))
            .with_header(USER_AGENT, HeaderValue::from_static("custom/1.0"))
            .with_payload(b"x".to_vec());
        conn.execute(request).await.unwrap();

        let req = &transport.requests()[0];
        assert_eq!(req.header("content-md5"), Some("given"));
        assert_eq!(req.header("user-agent"), Some("custom/1.0"));
    }

    #[tokio::test]
    async fn test_should_raise_service_error() {
        let transport = MockTransport::new(|_| {
            Ok(MockResponse::new(StatusCode::FORBIDDEN)
                .with_header("x-amz-request-id", "rid")
                .with_body("<Error><Code>AccessDenied</Code><Message>no</Message></Error>"))
        });
        let conn = conn(&test_config(), &transport);

        let err = conn
            .execute(OosRequest::new(Method::GET, "bucket", "k"))
            .await
            .unwrap_err();
        assert!(err.is_service_error());
        assert_eq!(err.service_code(), Some("AccessDenied"));
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn test_should_surface_transport_errors_unchanged() {
        let transport =
            MockTransport::new(|_| Err(OosError::transport(std::io::Error::other("reset"))));
        let conn = conn(&test_config(), &transport);

        let err = conn
            .execute(OosRequest::new(Method::GET, "bucket", "k"))
            .await
            .unwrap_err();
        assert!(err.is_transport_error());
    }

    #[test]
    fn test_should_fail_construction_when_scope_cannot_be_inferred() {
        let mut config = test_config();
        config.endpoint = "storage.example.com".to_owned();
        let err = Conn::new(&config, MockTransport::ok()).unwrap_err();
        assert!(err.is_parameter_error());

        config.region = Some("hz".to_owned());
        config.service = Some("s3".to_owned());
        assert!(Conn::new(&config, MockTransport::ok()).is_ok());
    }

    #[test]
    fn test_should_build_v4_presigned_url() {
        let conn = conn(&test_config(), &MockTransport::ok());
        let url = conn
            .sign_url(&Method::GET, "bucket", "k", 900, QueryParams::new(), &HeaderMap::new())
            .unwrap();
        assert!(url.starts_with("http://oos-cn.ctyunapi.cn/bucket/k?"));
        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains("X-Amz-Expires=900"));
        assert!(url.contains("X-Amz-SignedHeaders=host"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[test]
    fn test_should_carry_security_token_on_legacy_presigned_url() {
        let mut config = test_config();
        config.signature_version = SignatureVersion::V2;
        config.security_token = Some("tok".to_owned());
        let conn = conn(&config, &MockTransport::ok());
        let url = conn
            .sign_url(&Method::GET, "bucket", "k", 60, QueryParams::new(), &HeaderMap::new())
            .unwrap();
        assert!(url.contains("AWSAccessKeyId=ak"));
        assert!(url.contains("Expires="));
        assert!(url.contains("Signature="));
        assert!(url.contains("security-token=tok"));
    }

    #[tokio::test]
    async fn test_should_send_presigned_request_without_signing() {
        let transport = MockTransport::ok();
        let conn = conn(&test_config(), &transport);

        conn.execute_url(
            Method::PUT,
            "http://oos-cn.ctyunapi.cn/bucket/k?Signature=abc",
            HeaderMap::new(),
            Payload::from(b"hello".to_vec()),
        )
        .await
        .unwrap();

        let req = &transport.requests()[0];
        assert_eq!(req.url, "http://oos-cn.ctyunapi.cn/bucket/k?Signature=abc");
        assert!(req.header("authorization").is_none());
        assert!(req.header(X_AMZ_CONTENT_SHA256).is_none());
        assert_eq!(req.header("content-md5"), Some("XUFAKrxLKna5cZ2REBfFkg=="));
        assert_eq!(req.header("host"), Some("oos-cn.ctyunapi.cn"));
    }
}
