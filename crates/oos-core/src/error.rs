//! Client error types.
//!
//! Every fallible operation of this crate returns [`OosResult`]. The variants
//! fall into three families that callers usually branch on:
//!
//! - parameter errors, raised before any I/O ([`OosError::is_parameter_error`]);
//! - transport errors, surfaced unchanged and never retried
//!   ([`OosError::is_transport_error`]);
//! - service errors, built from the response status and `<Error>` document
//!   ([`OosError::is_service_error`]).
//!
//! # Usage
//!
//! ```
//! use oos_core::OosError;
//!
//! let err = OosError::Service {
//!     status: 404,
//!     code: "NoSuchKey".to_owned(),
//!     message: "The specified key does not exist.".to_owned(),
//!     request_id: "4442587FB7D0A2F9".to_owned(),
//!     host_id: String::new(),
//!     resource: "/bucket/missing".to_owned(),
//! };
//! assert!(err.is_service_error());
//! assert_eq!(err.service_code(), Some("NoSuchKey"));
//! ```

use oos_auth::AuthError;
use oos_xml::XmlError;

/// Result alias used across the client.
pub type OosResult<T> = Result<T, OosError>;

/// Boxed source of a transport failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum OosError {
    // -----------------------------------------------------------------------
    // Parameter errors
    // -----------------------------------------------------------------------
    /// The client configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An argument of an operation is invalid.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Signing material could not be derived.
    #[error(transparent)]
    Auth(#[from] AuthError),

    // -----------------------------------------------------------------------
    // Transport errors
    // -----------------------------------------------------------------------
    /// The HTTP exchange itself failed.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    // -----------------------------------------------------------------------
    // Service errors
    // -----------------------------------------------------------------------
    /// The service answered with an `<Error>` document.
    #[error("oos: service returned error: status={status}, code={code}, message={message}, request_id={request_id}")]
    Service {
        /// HTTP status code.
        status: u16,
        /// Service error code.
        code: String,
        /// Service error message.
        message: String,
        /// Value of the `x-amz-request-id` response header.
        request_id: String,
        /// Host id from the error document.
        host_id: String,
        /// Resource from the error document.
        resource: String,
    },

    /// The service answered with a 3xx redirect.
    #[error("oos: service returned redirect status {status}")]
    Redirect {
        /// HTTP status code.
        status: u16,
    },

    /// The service answered 4xx/5xx without a body.
    #[error("oos: service returned empty response body, status={status}, request_id={request_id}")]
    EmptyErrorBody {
        /// HTTP status code.
        status: u16,
        /// Value of the `x-amz-request-id` response header.
        request_id: String,
    },

    /// The service answered 4xx/5xx with a body that is not an `<Error>` document.
    #[error("oos: service returned invalid response body, status={status}, request_id={request_id}")]
    InvalidErrorBody {
        /// HTTP status code.
        status: u16,
        /// Value of the `x-amz-request-id` response header.
        request_id: String,
        /// Why the body could not be decoded.
        #[source]
        source: XmlError,
    },

    /// The service answered with a status outside every known class.
    #[error("oos: unexpected status {status}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
    },

    /// A successful status that the operation does not accept.
    #[error("oos: unexpected status code {got}, expected one of {allowed:?}")]
    UnexpectedStatusCode {
        /// Accepted status codes.
        allowed: Vec<u16>,
        /// Received status code.
        got: u16,
    },

    /// A response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Xml(#[from] XmlError),

    /// A response header required by the operation is missing or malformed.
    #[error("missing or invalid response header: {0}")]
    InvalidResponseHeader(String),

    /// Fewer or more bytes than expected were received.
    #[error("unexpected content length: expected {expected}, got {actual}")]
    UnexpectedContentLength {
        /// Expected byte count.
        expected: u64,
        /// Received byte count.
        actual: u64,
    },

    // -----------------------------------------------------------------------
    // Local errors
    // -----------------------------------------------------------------------
    /// Local file system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A checkpoint could not be used.
    #[error("invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    /// Checkpoint (de)serialization failure.
    #[error("checkpoint encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// The transfer stopped before every part was accounted for.
    #[error("transfer interrupted: {0}")]
    Interrupted(String),
}

impl OosError {
    /// Wrap a transport failure.
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Self::Transport(err.into())
    }

    /// Whether the error was raised before any I/O because of bad input.
    #[must_use]
    pub fn is_parameter_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::InvalidParameter(_) | Self::Auth(_)
        )
    }

    /// Whether the error comes from the HTTP exchange.
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether the error describes a response of the service.
    #[must_use]
    pub fn is_service_error(&self) -> bool {
        matches!(
            self,
            Self::Service { .. }
                | Self::Redirect { .. }
                | Self::EmptyErrorBody { .. }
                | Self::InvalidErrorBody { .. }
                | Self::UnexpectedStatus { .. }
                | Self::UnexpectedStatusCode { .. }
        )
    }

    /// HTTP status of a service error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. }
            | Self::Redirect { status }
            | Self::EmptyErrorBody { status, .. }
            | Self::InvalidErrorBody { status, .. }
            | Self::UnexpectedStatus { status } => Some(*status),
            Self::UnexpectedStatusCode { got, .. } => Some(*got),
            _ => None,
        }
    }

    /// Service error code, e.g. `NoSuchKey`.
    #[must_use]
    pub fn service_code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code),
            _ => None,
        }
    }
}
