//! Client for OOS, an S3-compatible object storage service.
//!
//! The crate signs and dispatches requests, wraps the object and multipart
//! APIs, and drives large transfers as concurrently moved parts that can be
//! checkpointed and resumed.
//!
//! # Architecture
//!
//! ```text
//!   Bucket (object ops, copy_file / upload_file / download_file / compose)
//!        |                       |
//!        |                 TransferEngine (workers, checkpoint, progress)
//!        v                       |
//!   Conn::execute  <-------------+
//!   (hash body, stamp headers, sign)
//!        |
//!        v
//!   HttpTransport (reqwest)  ->  response::classify
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use oos_core::{Client, ClientConfig, TransferOptions};
//!
//! # async fn run() -> oos_core::OosResult<()> {
//! let client = Client::new(ClientConfig::from_env())?;
//! let bucket = client.bucket("backups")?;
//! let options = TransferOptions::builder().routines(8).build();
//! bucket
//!     .upload_file("db/dump.tar", "/var/backups/dump.tar", 8 * 1024 * 1024, &options)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod body;
pub mod client;
pub mod config;
pub mod conn;
pub mod endpoint;
pub mod error;
pub mod object;
pub mod response;
pub mod transfer;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use body::Payload;
pub use client::{Bucket, Client};
pub use config::{ClientConfig, SignatureVersion};
pub use error::{OosError, OosResult};
pub use object::ByteRange;
pub use oos_auth::{Credentials, QueryParams};
pub use transfer::{
    CheckpointConfig, CopySource, PartInterceptor, ProgressEvent, ProgressEventKind, ProgressListener,
    TransferOptions,
};
pub use transport::{HttpTransport, ReqwestTransport};
