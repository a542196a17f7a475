//! XML encoding of OOS request and response bodies.
//!
//! The service speaks the S3 RestXml dialect. This crate covers the documents a
//! multipart transfer exchanges with it.
//!
//! # Key components
//!
//! - [`XmlSerialize`] trait and [`to_xml`] function for request bodies
//!   (`CompleteMultipartUpload`)
//! - [`XmlDeserialize`] trait and [`from_xml`] function for response bodies
//!   (`InitiateMultipartUploadResult`, `CopyPartResult`,
//!   `CompleteMultipartUploadResult`, and the `Error` document)
//!
//! # Conventions
//!
//! - Namespace: `http://s3.amazonaws.com/doc/2006-03-01/`
//! - Timestamps: ISO 8601 (`2006-02-03T16:45:09.000Z`)
//! - XML declaration: `<?xml version="1.0" encoding="UTF-8"?>`

pub mod deserialize;
pub mod error;
pub mod serialize;

pub use deserialize::{XmlDeserialize, from_xml};
pub use error::XmlError;
pub use serialize::{S3_NAMESPACE, XmlSerialize, to_xml};
