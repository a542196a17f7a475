//! Endpoint parsing and request URL construction.

use std::net::IpAddr;

use oos_auth::canonical::uri_encode;

use crate::error::{OosError, OosResult};

/// How the endpoint host addresses buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// A literal IP address; path-style URLs.
    Ip,
    /// A CNAME bound to one bucket; the bucket is omitted from the path.
    Cname,
    /// A regular OOS host name; path-style URLs.
    Oos,
}

/// A parsed service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: String,
    netloc: String,
    kind: EndpointKind,
}

impl Endpoint {
    /// Parse `[http://|https://]netloc`. The scheme defaults to `http`.
    ///
    /// # Examples
    ///
    /// ```
    /// use oos_core::endpoint::{Endpoint, EndpointKind};
    ///
    /// let endpoint = Endpoint::parse("oos-cn.ctyunapi.cn", false).unwrap();
    /// assert_eq!(endpoint.scheme(), "http");
    /// assert_eq!(endpoint.kind(), EndpointKind::Oos);
    /// assert_eq!(
    ///     endpoint.url("bucket", "a b.txt", "uploads"),
    ///     "http://oos-cn.ctyunapi.cn/bucket/a%20b.txt?uploads"
    /// );
    /// ```
    pub fn parse(endpoint: &str, use_cname: bool) -> OosResult<Self> {
        let endpoint = endpoint.trim();
        let lower = endpoint.to_ascii_lowercase();
        let (scheme, rest) = if lower.starts_with("https://") {
            ("https", &endpoint["https://".len()..])
        } else if lower.starts_with("http://") {
            ("http", &endpoint["http://".len()..])
        } else {
            ("http", endpoint)
        };

        let netloc = rest.split('/').next().unwrap_or_default().to_owned();
        if netloc.is_empty() {
            return Err(OosError::InvalidConfig(format!(
                "endpoint has no host: {endpoint:?}"
            )));
        }

        let kind = if host_of(&netloc).parse::<IpAddr>().is_ok() {
            EndpointKind::Ip
        } else if use_cname {
            EndpointKind::Cname
        } else {
            EndpointKind::Oos
        };

        Ok(Self {
            scheme: scheme.to_owned(),
            netloc,
            kind,
        })
    }

    /// `http` or `https`.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host and optional port, used verbatim as the `Host` header.
    #[must_use]
    pub fn netloc(&self) -> &str {
        &self.netloc
    }

    /// Addressing style of the endpoint.
    #[must_use]
    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Build `scheme://netloc/path?query`. `query` must already be encoded.
    #[must_use]
    pub fn url(&self, bucket: &str, key: &str, query: &str) -> String {
        let path = self.path(bucket, key);
        if query.is_empty() {
            format!("{}://{}{path}", self.scheme, self.netloc)
        } else {
            format!("{}://{}{path}?{query}", self.scheme, self.netloc)
        }
    }

    fn path(&self, bucket: &str, key: &str) -> String {
        let key = uri_encode(key, true);
        match self.kind {
            EndpointKind::Cname => format!("/{key}"),
            EndpointKind::Ip if !bucket.is_empty() => format!("/{bucket}/{key}"),
            _ if bucket.is_empty() => "/".to_owned(),
            _ if key.is_empty() => format!("/{bucket}"),
            _ => format!("/{bucket}/{key}"),
        }
    }
}

/// Strip the port and IPv6 brackets from a netloc.
fn host_of(netloc: &str) -> &str {
    if let Some(rest) = netloc.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match netloc.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => netloc,
    }
}
