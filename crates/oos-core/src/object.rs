//! Object operations.
//!
//! Thin signed-request wrappers over the object and multipart APIs. The
//! transfer engine is built from these primitives.

use std::path::{Path, PathBuf};

use http::header::{CONTENT_LENGTH, ETAG, HeaderName, HeaderValue, LAST_MODIFIED, RANGE};
use http::{HeaderMap, Method};
use oos_auth::QueryParams;
use oos_auth::canonical::uri_encode;
use oos_model::{
    CompleteMultipartUpload, CompleteMultipartUploadResult, CompletedPart, CopyPartResult,
    InitiateMultipartUploadResult, ObjectStat,
};
use tracing::debug;

use crate::body::Payload;
use crate::client::Bucket;
use crate::conn::OosRequest;
use crate::error::{OosError, OosResult};
use crate::response::expect_status;
use crate::transport::HttpResponse;

/// Source object header of `UploadPartCopy`.
pub const X_AMZ_COPY_SOURCE: &str = "x-amz-copy-source";

/// Source range header of `UploadPartCopy`.
pub const X_AMZ_COPY_SOURCE_RANGE: &str = "x-amz-copy-source-range";

/// Suffix of the file a download is written to before it is renamed.
pub const TEMP_FILE_SUFFIX: &str = ".temp";

/// An inclusive byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte.
    pub start: u64,
    /// Last byte, inclusive.
    pub end: u64,
}

impl ByteRange {
    /// Create a range.
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// `bytes=start-end`.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Number of bytes covered.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Path of the temporary file a download of `path` is written to.
#[must_use]
pub fn temp_file_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(TEMP_FILE_SUFFIX);
    PathBuf::from(name)
}

impl Bucket {
    /// Store an object. Returns its ETag.
    pub async fn put_object(
        &self,
        key: &str,
        payload: impl Into<Payload>,
        headers: HeaderMap,
    ) -> OosResult<String> {
        require_key(key)?;
        let request = OosRequest::new(Method::PUT, &self.name, key)
            .with_headers(headers)
            .with_payload(payload);
        let response = self.conn.execute(request).await?;
        Ok(response.header(ETAG.as_str()).unwrap_or_default().to_owned())
    }

    /// Store a local file as an object. Returns its ETag.
    pub async fn put_object_from_file(
        &self,
        key: &str,
        path: impl AsRef<Path>,
        headers: HeaderMap,
    ) -> OosResult<String> {
        let payload = Payload::from_file(path).await?;
        self.put_object(key, payload, headers).await
    }

    /// Fetch an object, optionally a byte range of it. The body is returned
    /// unconsumed.
    pub async fn get_object(&self, key: &str, range: Option<ByteRange>) -> OosResult<HttpResponse> {
        require_key(key)?;
        let mut request = OosRequest::new(Method::GET, &self.name, key);
        if let Some(range) = range {
            request = request.with_header(RANGE, header_value(&range.header_value())?);
        }
        self.conn.execute(request).await
    }

    /// Download an object to a local file. The data lands in `<path>.temp`
    /// first and is renamed once complete. Returns the number of bytes written.
    pub async fn get_object_to_file(&self, key: &str, path: impl AsRef<Path>) -> OosResult<u64> {
        let path = path.as_ref();
        let response = self.get_object(key, None).await?;
        write_response_to_file(response, path).await
    }

    /// Headers of an object.
    pub async fn head_object(&self, key: &str) -> OosResult<HeaderMap> {
        require_key(key)?;
        let response = self
            .conn
            .execute(OosRequest::new(Method::HEAD, &self.name, key))
            .await?;
        Ok(response.headers)
    }

    /// Size, ETag and last-modified value of an object.
    pub async fn object_stat(&self, key: &str) -> OosResult<ObjectStat> {
        let headers = self.head_object(key).await?;
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned)
        };
        let size = text(CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| OosError::InvalidResponseHeader(CONTENT_LENGTH.to_string()))?;
        Ok(ObjectStat {
            size,
            last_modified: text(LAST_MODIFIED.as_str()).unwrap_or_default(),
            etag: text(ETAG.as_str()).unwrap_or_default(),
        })
    }

    /// Delete an object.
    pub async fn delete_object(&self, key: &str) -> OosResult<()> {
        require_key(key)?;
        let response = self
            .conn
            .execute(OosRequest::new(Method::DELETE, &self.name, key))
            .await?;
        expect_status(response, &[204])?;
        Ok(())
    }

    /// Start a multipart session.
    pub async fn initiate_multipart_upload(
        &self,
        key: &str,
        headers: HeaderMap,
    ) -> OosResult<InitiateMultipartUploadResult> {
        require_key(key)?;
        let request = OosRequest::new(Method::POST, &self.name, key)
            .with_flag("uploads")
            .with_headers(headers);
        let response = self.conn.execute(request).await?;
        let body = response.body.collect().await?;
        let result: InitiateMultipartUploadResult = oos_xml::from_xml(&body)?;
        debug!(bucket = %self.name, key, upload_id = %result.upload_id, "initiated multipart upload");
        Ok(result)
    }

    /// Upload one part of a multipart session.
    pub async fn upload_part(
        &self,
        session: &InitiateMultipartUploadResult,
        part_number: u32,
        payload: impl Into<Payload>,
    ) -> OosResult<CompletedPart> {
        require_part_number(part_number)?;
        let request = OosRequest::new(Method::PUT, &session.bucket, &session.key)
            .with_param("partNumber", part_number.to_string())
            .with_param("uploadId", session.upload_id.clone())
            .with_payload(payload);
        let response = self.conn.execute(request).await?;
        let etag = response
            .header(ETAG.as_str())
            .ok_or_else(|| OosError::InvalidResponseHeader(ETAG.to_string()))?;
        Ok(CompletedPart::new(part_number, etag))
    }

    /// Copy an object, or a range of it, into one part of a multipart session.
    pub async fn upload_part_copy(
        &self,
        session: &InitiateMultipartUploadResult,
        src_bucket: &str,
        src_key: &str,
        range: Option<ByteRange>,
        part_number: u32,
    ) -> OosResult<CompletedPart> {
        require_part_number(part_number)?;
        require_key(src_key)?;
        if src_bucket.is_empty() {
            return Err(OosError::InvalidParameter("source bucket is empty".to_owned()));
        }

        let source = format!("/{src_bucket}/{}", uri_encode(src_key, true));
        let mut request = OosRequest::new(Method::PUT, &session.bucket, &session.key)
            .with_param("partNumber", part_number.to_string())
            .with_param("uploadId", session.upload_id.clone())
            .with_header(HeaderName::from_static(X_AMZ_COPY_SOURCE), header_value(&source)?);
        if let Some(range) = range {
            request = request.with_header(
                HeaderName::from_static(X_AMZ_COPY_SOURCE_RANGE),
                header_value(&range.header_value())?,
            );
        }

        let response = self.conn.execute(request).await?;
        let body = response.body.collect().await?;
        let result: CopyPartResult = oos_xml::from_xml(&body)?;
        Ok(CompletedPart::new(part_number, result.etag))
    }

    /// Assemble the uploaded parts into the final object. Parts are sent in
    /// ascending part-number order.
    pub async fn complete_multipart_upload(
        &self,
        session: &InitiateMultipartUploadResult,
        parts: Vec<CompletedPart>,
    ) -> OosResult<CompleteMultipartUploadResult> {
        let document = CompleteMultipartUpload::new(parts);
        let xml = oos_xml::to_xml("CompleteMultipartUpload", &document)?;
        let request = OosRequest::new(Method::POST, &session.bucket, &session.key)
            .with_param("uploadId", session.upload_id.clone())
            .with_payload(xml);
        let response = self.conn.execute(request).await?;
        let body = response.body.collect().await?;
        if body.is_empty() {
            return Ok(CompleteMultipartUploadResult {
                bucket: session.bucket.clone(),
                key: session.key.clone(),
                ..CompleteMultipartUploadResult::default()
            });
        }
        Ok(oos_xml::from_xml(&body)?)
    }

    /// Discard a multipart session and its parts.
    pub async fn abort_multipart_upload(&self, session: &InitiateMultipartUploadResult) -> OosResult<()> {
        let request = OosRequest::new(Method::DELETE, &session.bucket, &session.key)
            .with_param("uploadId", session.upload_id.clone());
        let response = self.conn.execute(request).await?;
        expect_status(response, &[204])?;
        Ok(())
    }

    /// Build a presigned URL for `key`.
    pub fn sign_url(
        &self,
        key: &str,
        method: &Method,
        expires_in_secs: u64,
        params: QueryParams,
        headers: &HeaderMap,
    ) -> OosResult<String> {
        require_key(key)?;
        self.conn
            .sign_url(method, &self.name, key, expires_in_secs, params, headers)
    }

    /// Upload through a presigned `PUT` URL. Returns the ETag.
    pub async fn put_object_with_url(
        &self,
        signed_url: &str,
        payload: impl Into<Payload>,
        headers: HeaderMap,
    ) -> OosResult<String> {
        let response = self
            .conn
            .execute_url(Method::PUT, signed_url, headers, payload.into())
            .await?;
        Ok(response.header(ETAG.as_str()).unwrap_or_default().to_owned())
    }

    /// Fetch through a presigned `GET` URL. The body is returned unconsumed.
    pub async fn get_object_with_url(&self, signed_url: &str, headers: HeaderMap) -> OosResult<HttpResponse> {
        self.conn
            .execute_url(Method::GET, signed_url, headers, Payload::Empty)
            .await
    }

    /// Download through a presigned `GET` URL into a local file.
    pub async fn get_object_to_file_with_url(&self, signed_url: &str, path: impl AsRef<Path>) -> OosResult<u64> {
        let response = self.get_object_with_url(signed_url, HeaderMap::new()).await?;
        write_response_to_file(response, path.as_ref()).await
    }
}

async fn write_response_to_file(response: HttpResponse, path: &Path) -> OosResult<u64> {
    let temp = temp_file_path(path);
    let mut file = tokio::fs::File::create(&temp).await?;
    let written = response.body.write_to(&mut file).await?;
    drop(file);
    tokio::fs::rename(&temp, path).await?;
    Ok(written)
}

fn require_key(key: &str) -> OosResult<()> {
    if key.is_empty() {
        return Err(OosError::InvalidParameter("object key is empty".to_owned()));
    }
    Ok(())
}

fn require_part_number(part_number: u32) -> OosResult<()> {
    if part_number == 0 {
        return Err(OosError::InvalidParameter(
            "part number must be at least 1".to_owned(),
        ));
    }
    Ok(())
}

fn header_value(value: &str) -> OosResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| OosError::InvalidParameter(format!("invalid header value: {value:?}")))
}
