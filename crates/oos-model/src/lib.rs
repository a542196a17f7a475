//! Data types exchanged with the OOS object storage service.
//!
//! These are the request and response shapes of the multipart and object
//! operations the client performs, independent of their XML encoding (see the
//! `oos-xml` crate) and of the HTTP layer.

pub mod types;

pub use types::{
    CompleteMultipartUpload, CompleteMultipartUploadResult, CompletedPart, CopyPartResult,
    ErrorBody, InitiateMultipartUploadResult, ObjectStat,
};
