//! Presigned URL query parameters.
//!
//! A presigned URL carries its credentials and expiry in the query string:
//!
//! ```text
//! Legacy: ?AWSAccessKeyId=AKID&Expires=1700000600&Signature=base64
//! V4:     ?X-Amz-Algorithm=AWS4-HMAC-SHA256
//!         &X-Amz-Credential=AKID%2F20130524%2Fus-east-1%2Fs3%2Faws4_request
//!         &X-Amz-Date=20130524T000000Z
//!         &X-Amz-Expires=86400
//!         &X-Amz-SignedHeaders=host
//!         &X-Amz-Signature=hex
//! ```
//!
//! The functions here add those parameters to a [`QueryParams`] map. V4 always
//! signs the payload as [`UNSIGNED_PAYLOAD`].

use chrono::{DateTime, Utc};
use http::HeaderMap;

use crate::canonical::{QueryParams, build_canonical_headers};
use crate::credentials::Credentials;
use crate::scope::SigningScope;
use crate::sigv2;
use crate::sigv4::{ALGORITHM, DATE_FORMAT, TIMESTAMP_FORMAT, UNSIGNED_PAYLOAD, compute_sigv4};

/// Legacy expiry parameter.
pub const PARAM_EXPIRES: &str = "Expires";
/// Legacy access key parameter.
pub const PARAM_ACCESS_KEY_ID: &str = "AWSAccessKeyId";
/// Legacy signature parameter.
pub const PARAM_SIGNATURE: &str = "Signature";

/// V4 algorithm parameter.
pub const PARAM_X_AMZ_ALGORITHM: &str = "X-Amz-Algorithm";
/// V4 credential parameter.
pub const PARAM_X_AMZ_CREDENTIAL: &str = "X-Amz-Credential";
/// V4 timestamp parameter.
pub const PARAM_X_AMZ_DATE: &str = "X-Amz-Date";
/// V4 expiry parameter (seconds).
pub const PARAM_X_AMZ_EXPIRES: &str = "X-Amz-Expires";
/// V4 signed headers parameter.
pub const PARAM_X_AMZ_SIGNED_HEADERS: &str = "X-Amz-SignedHeaders";
/// V4 signature parameter.
pub const PARAM_X_AMZ_SIGNATURE: &str = "X-Amz-Signature";

/// Add legacy presigned parameters. `expires_at` is a Unix timestamp that
/// takes the place of the `Date` header in the string to sign.
pub fn presign_v2(
    method: &str,
    headers: &HeaderMap,
    canonical_resource: &str,
    params: &mut QueryParams,
    credentials: &Credentials,
    expires_at: i64,
) {
    let expires = expires_at.to_string();
    let string_to_sign = sigv2::build_string_to_sign(method, headers, &expires, canonical_resource);
    let signature = sigv2::compute_signature(credentials.secret_access_key(), &string_to_sign);

    params.insert(PARAM_EXPIRES.to_owned(), Some(expires));
    params.insert(
        PARAM_ACCESS_KEY_ID.to_owned(),
        Some(credentials.access_key_id().to_owned()),
    );
    params.insert(PARAM_SIGNATURE.to_owned(), Some(signature));
}

/// Add V4 presigned parameters. The signature covers every parameter already
/// in `params` plus the `X-Amz-*` ones added here, except the signature itself.
#[allow(clippy::too_many_arguments)]
pub fn presign_v4(
    method: &str,
    headers: &HeaderMap,
    canonical_uri: &str,
    params: &mut QueryParams,
    credentials: &Credentials,
    scope: &SigningScope,
    timestamp: DateTime<Utc>,
    expires_in_secs: u64,
) {
    let signed_headers = build_canonical_headers(headers).signed;
    let credential_scope = scope.credential_scope(&timestamp.format(DATE_FORMAT).to_string());

    params.insert(PARAM_X_AMZ_ALGORITHM.to_owned(), Some(ALGORITHM.to_owned()));
    params.insert(
        PARAM_X_AMZ_CREDENTIAL.to_owned(),
        Some(format!("{}/{credential_scope}", credentials.access_key_id())),
    );
    params.insert(
        PARAM_X_AMZ_DATE.to_owned(),
        Some(timestamp.format(TIMESTAMP_FORMAT).to_string()),
    );
    params.insert(
        PARAM_X_AMZ_EXPIRES.to_owned(),
        Some(expires_in_secs.to_string()),
    );
    params.insert(PARAM_X_AMZ_SIGNED_HEADERS.to_owned(), Some(signed_headers));

    let signed = compute_sigv4(
        method,
        canonical_uri,
        params,
        headers,
        UNSIGNED_PAYLOAD,
        credentials,
        scope,
        timestamp,
    );
    params.insert(PARAM_X_AMZ_SIGNATURE.to_owned(), Some(signed.signature));
}
