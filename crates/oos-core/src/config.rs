//! Client configuration.
//!
//! Provides [`ClientConfig`] for configuring an OOS [`Client`](crate::Client).
//! Values can be assembled with the typed builder or loaded from `OOS_*`
//! environment variables.

use std::fmt;
use std::time::Duration;

use oos_auth::Credentials;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{OosError, OosResult};

/// Default in-memory threshold for payload hashing (16 MiB).
pub const DEFAULT_HASH_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Default user agent.
pub const DEFAULT_USER_AGENT: &str = concat!("oos-rust-sdk/", env!("CARGO_PKG_VERSION"));

/// Request signing protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureVersion {
    /// Legacy HMAC-SHA1 signing.
    V2,
    /// AWS Signature Version 4.
    #[default]
    V4,
}

/// OOS client configuration.
///
/// # Examples
///
/// ```
/// use oos_core::config::{ClientConfig, SignatureVersion};
///
/// let config = ClientConfig::builder()
///     .endpoint("https://oos-cn.ctyunapi.cn".into())
///     .access_key_id("ak".into())
///     .secret_access_key("sk".into())
///     .build();
/// assert_eq!(config.signature_version, SignatureVersion::V4);
/// assert!(config.enable_sha256);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Service endpoint, `[http://|https://]host[:port]`.
    #[builder(default)]
    pub endpoint: String,

    /// Access key id.
    #[builder(default)]
    pub access_key_id: String,

    /// Secret access key.
    #[builder(default)]
    #[serde(skip_serializing, default)]
    pub secret_access_key: String,

    /// Temporary security token.
    #[builder(default, setter(strip_option))]
    pub security_token: Option<String>,

    /// V4 signing region. Inferred from the endpoint host when unset.
    #[builder(default, setter(strip_option))]
    pub region: Option<String>,

    /// V4 signing service. Inferred from the endpoint host when unset.
    #[builder(default, setter(strip_option))]
    pub service: Option<String>,

    /// Signing protocol.
    #[builder(default)]
    pub signature_version: SignatureVersion,

    /// Whether V4 requests sign the payload SHA-256 instead of `UNSIGNED-PAYLOAD`.
    #[builder(default = true)]
    pub enable_sha256: bool,

    /// Whether the endpoint is a CNAME bound to a single bucket.
    #[builder(default = false)]
    pub use_cname: bool,

    /// Largest payload (in bytes) held in memory while computing `Content-MD5`.
    #[builder(default = DEFAULT_HASH_THRESHOLD)]
    pub md5_threshold: u64,

    /// Largest payload (in bytes) held in memory while computing the V4 payload hash.
    #[builder(default = DEFAULT_HASH_THRESHOLD)]
    pub sha256_threshold: u64,

    /// TCP connect timeout in seconds.
    #[builder(default = 30)]
    pub connect_timeout_secs: u64,

    /// Read/write timeout in seconds.
    #[builder(default = 60)]
    pub read_write_timeout_secs: u64,

    /// `User-Agent` header value.
    #[builder(default = String::from(DEFAULT_USER_AGENT))]
    pub user_agent: String,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("security_token", &self.security_token.as_ref().map(|_| "<redacted>"))
            .field("region", &self.region)
            .field("service", &self.service)
            .field("signature_version", &self.signature_version)
            .field("enable_sha256", &self.enable_sha256)
            .field("use_cname", &self.use_cname)
            .field("md5_threshold", &self.md5_threshold)
            .field("sha256_threshold", &self.sha256_threshold)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_write_timeout_secs", &self.read_write_timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables (falling back to defaults):
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `OOS_ENDPOINT` | empty |
    /// | `OOS_ACCESS_KEY_ID` | empty |
    /// | `OOS_SECRET_ACCESS_KEY` | empty |
    /// | `OOS_SECURITY_TOKEN` | unset |
    /// | `OOS_REGION` | inferred from the endpoint |
    /// | `OOS_SERVICE` | inferred from the endpoint |
    /// | `OOS_SIGNATURE_V4` | `true` |
    /// | `OOS_ENABLE_SHA256` | `true` |
    /// | `OOS_USE_CNAME` | `false` |
    /// | `OOS_USER_AGENT` | `oos-rust-sdk/<version>` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("OOS_ENDPOINT") {
            config.endpoint = v;
        }
        if let Ok(v) = std::env::var("OOS_ACCESS_KEY_ID") {
            config.access_key_id = v;
        }
        if let Ok(v) = std::env::var("OOS_SECRET_ACCESS_KEY") {
            config.secret_access_key = v;
        }
        if let Ok(v) = std::env::var("OOS_SECURITY_TOKEN") {
            config.security_token = non_empty(v);
        }
        if let Ok(v) = std::env::var("OOS_REGION") {
            config.region = non_empty(v);
        }
        if let Ok(v) = std::env::var("OOS_SERVICE") {
            config.service = non_empty(v);
        }
        if let Ok(v) = std::env::var("OOS_SIGNATURE_V4") {
            config.signature_version = if parse_bool(&v) {
                SignatureVersion::V4
            } else {
                SignatureVersion::V2
            };
        }
        if let Ok(v) = std::env::var("OOS_ENABLE_SHA256") {
            config.enable_sha256 = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("OOS_USE_CNAME") {
            config.use_cname = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("OOS_USER_AGENT") {
            config.user_agent = v;
        }

        config
    }

    /// Check that the configuration can build a client.
    pub fn validate(&self) -> OosResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(OosError::InvalidConfig("endpoint is empty".to_owned()));
        }
        if self.access_key_id.is_empty() {
            return Err(OosError::InvalidConfig("access key id is empty".to_owned()));
        }
        if self.secret_access_key.is_empty() {
            return Err(OosError::InvalidConfig(
                "secret access key is empty".to_owned(),
            ));
        }
        if self.md5_threshold == 0 || self.sha256_threshold == 0 {
            return Err(OosError::InvalidConfig(
                "hash thresholds must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    /// Signing credentials.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        let credentials = Credentials::new(&self.access_key_id, &self.secret_access_key);
        match &self.security_token {
            Some(token) => credentials.with_security_token(token),
            None => credentials,
        }
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Read/write timeout as a [`Duration`].
    #[must_use]
    pub fn read_write_timeout(&self) -> Duration {
        Duration::from_secs(self.read_write_timeout_secs)
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
