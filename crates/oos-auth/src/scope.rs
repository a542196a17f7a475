//! Signature Version 4 signing scope.
//!
//! A scope binds a signature to `date/region/service/aws4_request`. Region and
//! service are normally configured explicitly. When they are not, they are
//! inferred from the endpoint host name, whose service label follows the
//! `oos-<region>[-<service>]` pattern:
//!
//! | host label          | region | service      |
//! |---------------------|--------|--------------|
//! | `oos-cn`            | `cn`   | `s3`         |
//! | `oos-cn-iam`        | `cn`   | `sts`        |
//! | `oos-cn-cloudtrail` | `cn`   | `cloudtrail` |
//!
//! A host that does not follow the pattern is an error rather than an empty
//! scope component.

use crate::error::AuthError;

/// The final component of every V4 credential scope.
pub const SCOPE_TERMINATOR: &str = "aws4_request";

/// The service name used when the host carries no service token.
pub const DEFAULT_SERVICE: &str = "s3";

const HOST_LABEL_PREFIX: &str = "oos-";

/// Region and service a V4 signature is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningScope {
    region: String,
    service: String,
}

impl SigningScope {
    /// Create a scope from explicit values.
    pub fn new(region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            service: service.into(),
        }
    }

    /// The signing region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The signing service.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Resolve a scope from optional explicit settings, falling back to host
    /// inference for whatever is not configured.
    ///
    /// # Examples
    ///
    /// ```
    /// use oos_auth::SigningScope;
    ///
    /// let scope = SigningScope::resolve(None, None, "oos-cn-iam.ctyunapi.cn").unwrap();
    /// assert_eq!(scope, SigningScope::new("cn", "sts"));
    ///
    /// let explicit = SigningScope::resolve(Some("hz"), Some("s3"), "10.0.0.1:8080").unwrap();
    /// assert_eq!(explicit.region(), "hz");
    ///
    /// assert!(SigningScope::resolve(None, None, "storage.example.com").is_err());
    /// ```
    pub fn resolve(
        region: Option<&str>,
        service: Option<&str>,
        netloc: &str,
    ) -> Result<Self, AuthError> {
        if region.is_some_and(str::is_empty) {
            return Err(AuthError::EmptyScopeComponent("region"));
        }
        if service.is_some_and(str::is_empty) {
            return Err(AuthError::EmptyScopeComponent("service"));
        }

        if let (Some(region), Some(service)) = (region, service) {
            return Ok(Self::new(region, service));
        }

        let inferred = Self::infer_from_host(netloc)?;
        Ok(Self {
            region: region.map_or(inferred.region, ToOwned::to_owned),
            service: service.map_or(inferred.service, ToOwned::to_owned),
        })
    }

    /// Infer region and service from the endpoint's host name.
    pub fn infer_from_host(netloc: &str) -> Result<Self, AuthError> {
        let host = strip_port(netloc);
        let fail = |reason: &str| AuthError::ScopeInference {
            host: host.to_owned(),
            reason: reason.to_owned(),
        };

        let label = host
            .split('.')
            .find(|label| label.starts_with(HOST_LABEL_PREFIX))
            .ok_or_else(|| fail("no label starting with 'oos-'"))?;

        let mut tokens = label.split('-').skip(1);
        let region = tokens
            .next()
            .filter(|region| !region.is_empty())
            .ok_or_else(|| fail("empty region token"))?;

        let service = match tokens.next() {
            None => DEFAULT_SERVICE,
            Some("iam") => "sts",
            Some("cloudtrail") => "cloudtrail",
            Some(other) => return Err(fail(&format!("unrecognized service token '{other}'"))),
        };

        Ok(Self::new(region, service))
    }

    /// The credential scope string for a `YYYYMMDD` date.
    ///
    /// ```
    /// use oos_auth::SigningScope;
    ///
    /// let scope = SigningScope::new("us-east-1", "s3");
    /// assert_eq!(scope.credential_scope("20130524"), "20130524/us-east-1/s3/aws4_request");
    /// ```
    #[must_use]
    pub fn credential_scope(&self, date: &str) -> String {
        format!(
            "{date}/{}/{}/{SCOPE_TERMINATOR}",
            self.region, self.service
        )
    }
}

/// Drop a trailing `:port` and IPv6 brackets from a netloc.
fn strip_port(netloc: &str) -> &str {
    if let Some(rest) = netloc.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(host, _)| host);
    }
    match netloc.rsplit_once(':') {
        Some((host, port)) if port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => netloc,
    }
}
