//! Signing mode selection.
//!
//! A client owns exactly one [`Signer`], so a request is always signed with a
//! single scheme from its date header to its authorization material.

use chrono::{DateTime, Utc};
use http::header::{DATE, HeaderMap, HeaderName, HeaderValue};

use crate::canonical::{
    QueryParams, build_canonical_resource, build_canonical_resource_v4, build_sub_resource,
};
use crate::credentials::Credentials;
use crate::error::AuthError;
use crate::presigned::{presign_v2, presign_v4};
use crate::scope::SigningScope;
use crate::sigv4::{TIMESTAMP_FORMAT, X_AMZ_DATE};
use crate::{sigv2, sigv4};

/// RFC 1123 date format used by the legacy `Date` header.
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// A request as seen by the signer.
#[derive(Debug)]
pub struct SignableRequest<'a> {
    /// Upper-case HTTP method.
    pub method: &'a str,
    /// Bucket name, empty for service-level requests.
    pub bucket: &'a str,
    /// Object key (unencoded), empty for bucket-level requests.
    pub key: &'a str,
    /// Every query parameter of the request.
    pub params: &'a QueryParams,
    /// Request headers; the authorization header is written here.
    pub headers: &'a mut HeaderMap,
}

impl<'a> SignableRequest<'a> {
    /// Bundle the parts of a request.
    pub fn new(
        method: &'a str,
        bucket: &'a str,
        key: &'a str,
        params: &'a QueryParams,
        headers: &'a mut HeaderMap,
    ) -> Self {
        Self {
            method,
            bucket,
            key,
            params,
            headers,
        }
    }
}

/// The signing scheme of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signer {
    /// Legacy HMAC-SHA1 signing.
    Legacy,
    /// Signature Version 4 bound to a scope.
    V4(SigningScope),
}

impl Signer {
    /// Whether this is the V4 scheme.
    #[must_use]
    pub fn is_v4(&self) -> bool {
        matches!(self, Self::V4(_))
    }

    /// Set the date header this scheme signs: `x-amz-date` for V4, `Date` for
    /// the legacy scheme.
    pub fn stamp(&self, headers: &mut HeaderMap, now: DateTime<Utc>) {
        let (name, value) = match self {
            Self::Legacy => (DATE, now.format(HTTP_DATE_FORMAT).to_string()),
            Self::V4(_) => (
                HeaderName::from_static(X_AMZ_DATE),
                now.format(TIMESTAMP_FORMAT).to_string(),
            ),
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }

    /// Sign a request by setting its `Authorization` header.
    ///
    /// `now` must be the instant passed to [`Signer::stamp`].
    pub fn sign(
        &self,
        request: &mut SignableRequest<'_>,
        credentials: &Credentials,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        match self {
            Self::Legacy => {
                let resource = build_canonical_resource(
                    request.bucket,
                    request.key,
                    &build_sub_resource(request.params),
                );
                sigv2::sign_request(request.method, request.headers, &resource, credentials)
            }
            Self::V4(scope) => {
                let uri = build_canonical_resource_v4(request.bucket, request.key);
                sigv4::sign_request(
                    request.method,
                    request.headers,
                    &uri,
                    request.params,
                    credentials,
                    scope,
                    now,
                )
            }
        }
    }

    /// Add presigned URL parameters to `params`.
    ///
    /// `params` should already hold every other query parameter of the URL.
    #[allow(clippy::too_many_arguments)]
    pub fn presign(
        &self,
        method: &str,
        bucket: &str,
        key: &str,
        params: &mut QueryParams,
        headers: &HeaderMap,
        credentials: &Credentials,
        now: DateTime<Utc>,
        expires_in_secs: u64,
    ) {
        match self {
            Self::Legacy => {
                let resource = build_canonical_resource(bucket, key, &build_sub_resource(params));
                let expires_at =
                    now.timestamp() + i64::try_from(expires_in_secs).unwrap_or(i64::MAX / 2);
                presign_v2(method, headers, &resource, params, credentials, expires_at);
            }
            Self::V4(scope) => {
                let uri = build_canonical_resource_v4(bucket, key);
                presign_v4(
                    method,
                    headers,
                    &uri,
                    params,
                    credentials,
                    scope,
                    now,
                    expires_in_secs,
                );
            }
        }
    }
}
