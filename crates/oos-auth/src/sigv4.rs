//! AWS Signature Version 4 signing.
//!
//! This module implements the client side of the SigV4 flow:
//!
//! 1. Build the canonical request from the method, canonical URI, query
//!    parameters, the signed header subset and the payload hash.
//! 2. Build the string to sign from the timestamp, credential scope, and the
//!    canonical request hash.
//! 3. Derive the signing key using HMAC-SHA256 from the secret key and the
//!    credential scope components.
//! 4. Compute the signature and attach it as the `Authorization` header.
//!
//! The main entry point is [`sign_request`].

use chrono::{DateTime, Utc};
use hmac::{Hmac, KeyInit, Mac};
use http::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::canonical::{
    CanonicalHeaders, QueryParams, build_canonical_headers, build_canonical_query_string,
    build_canonical_request,
};
use crate::credentials::Credentials;
use crate::error::AuthError;
use crate::scope::SigningScope;

/// The signing algorithm literal.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Payload hash used by presigned URLs and by requests with payload hashing disabled.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Hex SHA-256 of the empty payload.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Name of the payload hash header.
pub const X_AMZ_CONTENT_SHA256: &str = "x-amz-content-sha256";

/// Name of the V4 timestamp header.
pub const X_AMZ_DATE: &str = "x-amz-date";

/// `YYYYMMDDTHHMMSSZ`, the timestamp format of `x-amz-date` and `X-Amz-Date`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// `YYYYMMDD`, the date format of the credential scope.
pub const DATE_FORMAT: &str = "%Y%m%d";

type HmacSha256 = Hmac<Sha256>;

/// Result of a SigV4 computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigV4Signature {
    /// Hex-encoded signature.
    pub signature: String,
    /// `date/region/service/aws4_request`.
    pub credential_scope: String,
    /// `;`-joined signed header names.
    pub signed_headers: String,
}

/// Build the SigV4 string to sign.
///
/// Format:
/// ```text
/// AWS4-HMAC-SHA256\n
/// <ISO8601 timestamp>\n
/// <credential_scope>\n
/// <hex(SHA256(canonical_request))>
/// ```
#[must_use]
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request_hash: &str,
) -> String {
    format!("{ALGORITHM}\n{timestamp}\n{credential_scope}\n{canonical_request_hash}")
}

/// Derive the SigV4 signing key using HMAC-SHA256 chain.
///
/// ```text
/// DateKey              = HMAC-SHA256("AWS4" + secret_key, date)
/// DateRegionKey        = HMAC-SHA256(DateKey, region)
/// DateRegionServiceKey = HMAC-SHA256(DateRegionKey, service)
/// SigningKey           = HMAC-SHA256(DateRegionServiceKey, "aws4_request")
/// ```
#[must_use]
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let date_region_key = hmac_sha256(&date_key, region.as_bytes());
    let date_region_service_key = hmac_sha256(&date_region_key, service.as_bytes());
    hmac_sha256(&date_region_service_key, b"aws4_request")
}

/// Compute the HMAC-SHA256 signature of `data` using the given `signing_key`.
///
/// Returns the hex-encoded signature.
#[must_use]
pub fn compute_signature(signing_key: &[u8], data: &str) -> String {
    hex::encode(hmac_sha256(signing_key, data.as_bytes()))
}

/// Compute a V4 signature for a request.
///
/// `payload_hash` is the value that goes in the last canonical request line:
/// the `x-amz-content-sha256` header for header-based signing, or
/// [`UNSIGNED_PAYLOAD`] for presigned URLs.
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn compute_sigv4(
    method: &str,
    canonical_uri: &str,
    params: &QueryParams,
    headers: &HeaderMap,
    payload_hash: &str,
    credentials: &Credentials,
    scope: &SigningScope,
    timestamp: DateTime<Utc>,
) -> SigV4Signature {
    let canonical_headers: CanonicalHeaders = build_canonical_headers(headers);
    let canonical_query = build_canonical_query_string(params);
    let canonical_request = build_canonical_request(
        method,
        canonical_uri,
        &canonical_query,
        &canonical_headers,
        payload_hash,
    );

    trace!(canonical_request = ?canonical_request, "Built canonical request");

    let date = timestamp.format(DATE_FORMAT).to_string();
    let credential_scope = scope.credential_scope(&date);
    let string_to_sign = build_string_to_sign(
        &timestamp.format(TIMESTAMP_FORMAT).to_string(),
        &credential_scope,
        &hash_payload(canonical_request.as_bytes()),
    );

    trace!(string_to_sign = ?string_to_sign, "Built string to sign");

    let signing_key = derive_signing_key(
        credentials.secret_access_key(),
        &date,
        scope.region(),
        scope.service(),
    );

    SigV4Signature {
        signature: compute_signature(&signing_key, &string_to_sign),
        credential_scope,
        signed_headers: canonical_headers.signed,
    }
}

/// Sign a request in place by setting its `Authorization` header.
///
/// The `x-amz-date` header should already carry `timestamp`; the payload hash
/// is read from `x-amz-content-sha256`.
pub fn sign_request(
    method: &str,
    headers: &mut HeaderMap,
    canonical_uri: &str,
    params: &QueryParams,
    credentials: &Credentials,
    scope: &SigningScope,
    timestamp: DateTime<Utc>,
) -> Result<(), AuthError> {
    let payload_hash = headers
        .get(X_AMZ_CONTENT_SHA256)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default();

    let signed = compute_sigv4(
        method,
        canonical_uri,
        params,
        headers,
        &payload_hash,
        credentials,
        scope,
        timestamp,
    );

    let authorization = format!(
        "{ALGORITHM} Credential={}/{}, SignedHeaders={}, Signature={}",
        credentials.access_key_id(),
        signed.credential_scope,
        signed.signed_headers,
        signed.signature
    );
    let value = HeaderValue::from_str(&authorization)
        .map_err(|_| AuthError::InvalidHeaderValue(AUTHORIZATION.to_string()))?;
    headers.insert(AUTHORIZATION, value);
    Ok(())
}

/// Compute HMAC-SHA256 and return the raw bytes.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can accept keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute the SHA-256 hash of the given payload and return it as a hex string.
///
/// # Examples
///
/// ```
/// use oos_auth::sigv4::{EMPTY_PAYLOAD_SHA256, hash_payload};
///
/// assert_eq!(hash_payload(b""), EMPTY_PAYLOAD_SHA256);
/// ```
#[must_use]
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}
