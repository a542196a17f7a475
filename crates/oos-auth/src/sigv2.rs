//! Legacy HMAC-SHA1 request signing.
//!
//! The `Authorization` header has the format:
//!
//! ```text
//! AWS <AccessKeyId>:<Signature>
//! ```
//!
//! Where `Signature = Base64(HMAC-SHA1(SecretKey, StringToSign))` and:
//!
//! ```text
//! StringToSign = HTTP-Verb + "\n" +
//!                Content-MD5 + "\n" +
//!                Content-Type + "\n" +
//!                Date + "\n" +
//!                CanonicalizedAmzHeaders +
//!                CanonicalizedResource
//! ```
//!
//! For presigned URLs the `Date` slot carries the expiry as a Unix timestamp.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, KeyInit, Mac};
use http::header::{AUTHORIZATION, CONTENT_TYPE, DATE, HeaderMap, HeaderValue};
use sha1::Sha1;
use tracing::trace;

use crate::canonical::build_canonicalized_amz_headers;
use crate::credentials::Credentials;
use crate::error::AuthError;

type HmacSha1 = Hmac<Sha1>;

/// Name of the `Content-MD5` header.
pub const CONTENT_MD5: &str = "content-md5";

/// Build the legacy string to sign.
///
/// `date` is passed explicitly: it is the `Date` header for header-based
/// signing and the expiry timestamp for presigned URLs.
///
/// # Examples
///
/// ```
/// use http::HeaderMap;
/// use oos_auth::sigv2::build_string_to_sign;
///
/// let sts = build_string_to_sign("GET", &HeaderMap::new(), "Tue, 27 Mar 2007 19:36:42 +0000", "/bucket/key");
/// assert_eq!(sts, "GET\n\n\nTue, 27 Mar 2007 19:36:42 +0000\n/bucket/key");
/// ```
#[must_use]
pub fn build_string_to_sign(
    method: &str,
    headers: &HeaderMap,
    date: &str,
    canonical_resource: &str,
) -> String {
    let content_md5 = header_str(headers, CONTENT_MD5);
    let content_type = header_str(headers, CONTENT_TYPE.as_str());
    let amz_headers = build_canonicalized_amz_headers(headers);

    format!("{method}\n{content_md5}\n{content_type}\n{date}\n{amz_headers}{canonical_resource}")
}

/// Compute the base64-encoded HMAC-SHA1 of `string_to_sign`.
#[must_use]
pub fn compute_signature(secret_key: &str, string_to_sign: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret_key.as_bytes()).expect("HMAC can accept any key length");
    mac.update(string_to_sign.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Sign a request in place by setting its `Authorization` header.
///
/// The `Date` header must already be set.
pub fn sign_request(
    method: &str,
    headers: &mut HeaderMap,
    canonical_resource: &str,
    credentials: &Credentials,
) -> Result<(), AuthError> {
    let date = header_str(headers, DATE.as_str()).into_owned();
    let string_to_sign = build_string_to_sign(method, headers, &date, canonical_resource);

    trace!(string_to_sign = ?string_to_sign, "Built legacy string to sign");

    let signature = compute_signature(credentials.secret_access_key(), &string_to_sign);
    let authorization = format!("AWS {}:{signature}", credentials.access_key_id());
    let value = HeaderValue::from_str(&authorization)
        .map_err(|_| AuthError::InvalidHeaderValue(AUTHORIZATION.to_string()))?;
    headers.insert(AUTHORIZATION, value);
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> std::borrow::Cow<'a, str> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()))
        .unwrap_or_default()
}
