//! Client and bucket handles.

use std::sync::Arc;

use crate::config::ClientConfig;
use crate::conn::Conn;
use crate::error::{OosError, OosResult};
use crate::transport::{HttpTransport, ReqwestTransport};

/// An OOS client.
///
/// Cloning is cheap; clones share the connection pool and signing state.
///
/// # Examples
///
/// ```
/// use oos_core::{Client, ClientConfig};
///
/// let config = ClientConfig::builder()
///     .endpoint("https://oos-cn.ctyunapi.cn".into())
///     .access_key_id("ak".into())
///     .secret_access_key("sk".into())
///     .build();
/// let client = Client::new(config).unwrap();
/// let bucket = client.bucket("photos").unwrap();
/// assert_eq!(bucket.name(), "photos");
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    conn: Arc<Conn>,
}

impl Client {
    /// Build a client with the default `reqwest` transport.
    pub fn new(config: ClientConfig) -> OosResult<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a client on a custom transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> OosResult<Self> {
        let conn = Conn::new(&config, transport)?;
        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    /// A handle to one bucket.
    pub fn bucket(&self, name: impl Into<String>) -> OosResult<Bucket> {
        let name = name.into();
        if name.is_empty() {
            return Err(OosError::InvalidParameter("bucket name is empty".to_owned()));
        }
        Ok(Bucket {
            name,
            conn: Arc::clone(&self.conn),
        })
    }

    /// The request dispatcher, for operations this crate does not wrap.
    #[must_use]
    pub fn conn(&self) -> &Conn {
        &self.conn
    }
}

/// A bucket handle; object and transfer operations hang off it.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub(crate) name: String,
    pub(crate) conn: Arc<Conn>,
}

impl Bucket {
    /// Bucket name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A handle to another bucket sharing this connection.
    pub(crate) fn sibling(&self, name: &str) -> OosResult<Self> {
        if name.is_empty() {
            return Err(OosError::InvalidParameter("bucket name is empty".to_owned()));
        }
        Ok(Self {
            name: name.to_owned(),
            conn: Arc::clone(&self.conn),
        })
    }
}
