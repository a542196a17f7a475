//! Service data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a multipart session, as returned by `InitiateMultipartUpload`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateMultipartUploadResult {
    /// Destination bucket.
    pub bucket: String,
    /// Destination key.
    pub key: String,
    /// Opaque session id.
    pub upload_id: String,
}

/// A finished part: its number and the ETag the service returned for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: u32,
    /// ETag of the part, quotes included as returned.
    pub etag: String,
}

impl CompletedPart {
    /// Create a completed part.
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}

/// Body of `CompleteMultipartUpload`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompleteMultipartUpload {
    /// Parts in ascending part-number order.
    pub parts: Vec<CompletedPart>,
}

impl CompleteMultipartUpload {
    /// Build the request body, sorting parts by number.
    #[must_use]
    pub fn new(mut parts: Vec<CompletedPart>) -> Self {
        parts.sort_by_key(|part| part.part_number);
        Self { parts }
    }
}

/// Response of `CompleteMultipartUpload`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompleteMultipartUploadResult {
    /// URL of the assembled object.
    pub location: String,
    /// Bucket of the assembled object.
    pub bucket: String,
    /// Key of the assembled object.
    pub key: String,
    /// ETag of the assembled object.
    pub etag: String,
}

/// Response of `UploadPartCopy`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyPartResult {
    /// Last-modified time of the copied part.
    pub last_modified: Option<DateTime<Utc>>,
    /// ETag of the copied part.
    pub etag: String,
}

/// The `<Error>` document of a failed request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorBody {
    /// Service error code, e.g. `NoSuchKey`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Request id assigned by the service.
    pub request_id: String,
    /// Host id assigned by the service.
    pub host_id: String,
    /// Resource the error refers to.
    pub resource: String,
}

/// Size, ETag and last-modified value of a transfer source.
///
/// For objects these are the `Content-Length`, `ETag` and `Last-Modified`
/// response headers verbatim. For local files the ETag is empty and the
/// modification time is rendered as RFC 3339.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStat {
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub last_modified: String,
    /// Entity tag.
    pub etag: String,
}
