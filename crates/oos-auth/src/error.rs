//! Error types for request signing.
//!
//! Signing itself is infallible once its inputs are well formed. Errors surface
//! while resolving the V4 scope from configuration or when a computed value
//! cannot be carried in an HTTP header.

/// Errors that can occur while preparing or signing a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The signing scope could not be derived from the endpoint host name and
    /// was not supplied explicitly.
    #[error("Cannot infer signing scope from host '{host}': {reason}")]
    ScopeInference {
        /// The host the inference was attempted on.
        host: String,
        /// Which part of the naming pattern did not match.
        reason: String,
    },

    /// An explicitly configured scope component is empty.
    #[error("Invalid signing scope: {0} must not be empty")]
    EmptyScopeComponent(&'static str),

    /// A computed value is not a valid HTTP header value.
    #[error("Invalid value for header {0}")]
    InvalidHeaderValue(String),
}
