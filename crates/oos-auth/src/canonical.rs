//! Canonical resource, query string and header construction.
//!
//! The legacy scheme signs a canonical resource of the form
//!
//! ```text
//! /bucket/url-encoded-key?sub-resources
//! ```
//!
//! where only an allow-list of query parameters (the "sub-resources") take part,
//! sorted by name and with raw values. Signature Version 4 signs the same path
//! without a query, and signs every query parameter separately through the
//! canonical query string:
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n
//! \n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! All builders iterate sorted maps, so the output never depends on the order in
//! which parameters or headers were inserted.

use std::collections::BTreeMap;

use http::HeaderMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Query parameters of a request. A `None` value marks a bare key such as `?uploads`.
///
/// `BTreeMap` keeps keys in ascending byte order, which is the order every
/// canonical form requires.
pub type QueryParams = BTreeMap<String, Option<String>>;

/// Query parameters that identify a sub-resource and are part of the legacy
/// canonical resource. Sorted for binary search.
pub const SUB_RESOURCES: &[&str] = &[
    "acl",
    "cors",
    "delete",
    "lifecycle",
    "location",
    "logging",
    "notification",
    "partNumber",
    "policy",
    "requestPayment",
    "response-cache-control",
    "response-content-disposition",
    "response-content-encoding",
    "response-content-language",
    "response-content-type",
    "response-expires",
    "restore",
    "tagging",
    "torrent",
    "uploadId",
    "uploads",
    "versionId",
    "versioning",
    "versions",
    "website",
];

/// Characters escaped in query names and values: everything except the RFC 3986
/// unreserved set (`A-Z a-z 0-9 - _ . ~`). Space becomes `%20`, `/` becomes `%2F`.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Same as [`QUERY_ENCODE_SET`] but keeps `/` so object keys retain their path shape.
const OBJECT_KEY_ENCODE_SET: &AsciiSet = &QUERY_ENCODE_SET.remove(b'/');

/// Percent-encode `value` with uppercase hex digits.
///
/// Object keys (`is_object_key`) keep `/` unescaped; query names and values
/// escape it.
///
/// # Examples
///
/// ```
/// use oos_auth::canonical::uri_encode;
///
/// assert_eq!(uri_encode("photos/my cat.jpg", true), "photos/my%20cat.jpg");
/// assert_eq!(uri_encode("a/b", false), "a%2Fb");
/// assert_eq!(uri_encode("~safe-_.", false), "~safe-_.");
/// ```
#[must_use]
pub fn uri_encode(value: &str, is_object_key: bool) -> String {
    let set = if is_object_key {
        OBJECT_KEY_ENCODE_SET
    } else {
        QUERY_ENCODE_SET
    };
    utf8_percent_encode(value, set).to_string()
}

/// Whether `key` is a signed sub-resource in the legacy scheme.
#[must_use]
pub fn is_sub_resource(key: &str) -> bool {
    SUB_RESOURCES.binary_search(&key).is_ok()
}

/// Join the sub-resource parameters as `k` or `k=v`, sorted, values unencoded.
///
/// # Examples
///
/// ```
/// use oos_auth::QueryParams;
/// use oos_auth::canonical::build_sub_resource;
///
/// let mut params = QueryParams::new();
/// params.insert("uploadId".to_owned(), Some("abc".to_owned()));
/// params.insert("partNumber".to_owned(), Some("3".to_owned()));
/// params.insert("max-keys".to_owned(), Some("10".to_owned()));
/// assert_eq!(build_sub_resource(&params), "partNumber=3&uploadId=abc");
/// ```
#[must_use]
pub fn build_sub_resource(params: &QueryParams) -> String {
    params
        .iter()
        .filter(|(key, _)| is_sub_resource(key))
        .map(|(key, value)| match value {
            Some(value) => format!("{key}={value}"),
            None => key.clone(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the `/bucket/key` path shared by both canonical resource variants.
fn build_resource_path(bucket: &str, key: &str) -> String {
    let mut resource = String::new();
    if !bucket.is_empty() {
        resource.push('/');
        resource.push_str(bucket);
    }
    if !key.is_empty() {
        resource.push('/');
        resource.push_str(&uri_encode(key, true));
    }
    resource
}

/// Canonical resource for the legacy scheme: the path followed by the
/// sub-resource string. An empty resource is `/`.
///
/// # Examples
///
/// ```
/// use oos_auth::canonical::build_canonical_resource;
///
/// assert_eq!(build_canonical_resource("", "", ""), "/");
/// assert_eq!(
///     build_canonical_resource("bucket", "dir/a b.txt", "uploads"),
///     "/bucket/dir/a%20b.txt?uploads"
/// );
/// ```
#[must_use]
pub fn build_canonical_resource(bucket: &str, key: &str, sub_resource: &str) -> String {
    let mut resource = build_resource_path(bucket, key);
    if !sub_resource.is_empty() {
        resource.push('?');
        resource.push_str(sub_resource);
    }
    if resource.is_empty() {
        resource.push('/');
    }
    resource
}

/// Canonical URI for Signature Version 4: the resource path without any query.
#[must_use]
pub fn build_canonical_resource_v4(bucket: &str, key: &str) -> String {
    let resource = build_resource_path(bucket, key);
    if resource.is_empty() {
        "/".to_owned()
    } else {
        resource
    }
}

/// Canonical query string for Signature Version 4.
///
/// Every parameter is included, names and values are encoded, and bare keys
/// are emitted as `k=`.
///
/// # Examples
///
/// ```
/// use oos_auth::QueryParams;
/// use oos_auth::canonical::build_canonical_query_string;
///
/// let mut params = QueryParams::new();
/// params.insert("uploads".to_owned(), None);
/// params.insert("prefix".to_owned(), Some("a b/c".to_owned()));
/// assert_eq!(build_canonical_query_string(&params), "prefix=a%20b%2Fc&uploads=");
/// ```
#[must_use]
pub fn build_canonical_query_string(params: &QueryParams) -> String {
    params
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                uri_encode(key, false),
                value.as_deref().map(|v| uri_encode(v, false)).unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Query string placed on the request URL. Bare keys carry no `=`.
///
/// # Examples
///
/// ```
/// use oos_auth::QueryParams;
/// use oos_auth::canonical::build_url_query_string;
///
/// let mut params = QueryParams::new();
/// params.insert("uploads".to_owned(), None);
/// params.insert("Signature".to_owned(), Some("a+b/c=".to_owned()));
/// assert_eq!(build_url_query_string(&params), "Signature=a%2Bb%2Fc%3D&uploads");
/// ```
#[must_use]
pub fn build_url_query_string(params: &QueryParams) -> String {
    params
        .iter()
        .map(|(key, value)| match value {
            Some(value) => format!("{}={}", uri_encode(key, false), uri_encode(value, false)),
            None => uri_encode(key, false),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Whether a header takes part in Signature Version 4 canonicalization.
fn is_v4_signed_header(name: &str) -> bool {
    name == "host" || name == "content-type" || name.starts_with("x-amz-")
}

/// Canonical headers and the matching signed-header list of a V4 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalHeaders {
    /// `name:value\n` lines, sorted by name.
    pub canonical: String,
    /// `;`-joined header names, sorted.
    pub signed: String,
}

/// Build the V4 canonical headers from a header map.
///
/// Only `host`, `content-type` and `x-amz-*` headers are considered. Names are
/// lowercase (as stored by [`HeaderMap`]); values are trimmed. For a repeated
/// header the first value wins.
#[must_use]
pub fn build_canonical_headers(headers: &HeaderMap) -> CanonicalHeaders {
    let selected: BTreeMap<&str, String> = headers
        .keys()
        .map(http::HeaderName::as_str)
        .filter(|name| is_v4_signed_header(name))
        .filter_map(|name| {
            headers
                .get(name)
                .map(|value| (name, String::from_utf8_lossy(value.as_bytes()).trim().to_owned()))
        })
        .collect();

    let canonical = selected
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect::<String>();
    let signed = selected.keys().copied().collect::<Vec<_>>().join(";");

    CanonicalHeaders { canonical, signed }
}

/// Build the legacy canonicalized `x-amz-*` header block, one `name:value\n`
/// line per header, sorted by name. Values are taken verbatim.
#[must_use]
pub fn build_canonicalized_amz_headers(headers: &HeaderMap) -> String {
    let amz: BTreeMap<&str, String> = headers
        .keys()
        .map(http::HeaderName::as_str)
        .filter(|name| name.starts_with("x-amz-"))
        .filter_map(|name| {
            headers
                .get(name)
                .map(|value| (name, String::from_utf8_lossy(value.as_bytes()).into_owned()))
        })
        .collect();

    amz.iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect()
}

/// Build the full V4 canonical request string from its components.
///
/// The canonical header block already ends with a newline; one more newline
/// separates it from the signed-header list.
///
/// # Examples
///
/// ```
/// use oos_auth::canonical::{CanonicalHeaders, build_canonical_request};
///
/// let headers = CanonicalHeaders {
///     canonical: "host:examplebucket.s3.amazonaws.com\n".to_owned(),
///     signed: "host".to_owned(),
/// };
/// let canonical = build_canonical_request("GET", "/test.txt", "", &headers, "UNSIGNED-PAYLOAD");
/// assert_eq!(
///     canonical,
///     "GET\n/test.txt\n\nhost:examplebucket.s3.amazonaws.com\n\nhost\nUNSIGNED-PAYLOAD"
/// );
/// ```
#[must_use]
pub fn build_canonical_request(
    method: &str,
    canonical_uri: &str,
    canonical_query: &str,
    headers: &CanonicalHeaders,
    payload_hash: &str,
) -> String {
    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{}\n{}\n{payload_hash}",
        headers.canonical, headers.signed
    )
}
