//! Request payloads and content hashing.
//!
//! Computing `Content-MD5` or the V4 payload hash requires reading the payload
//! before it is sent. Payloads of known length up to the configured threshold
//! are materialized in memory; anything larger, or of unknown length, is
//! spilled to an anonymous temporary file and replayed from there.

use std::fmt;
use std::io::SeekFrom;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use digest::Digest;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::OosResult;
use crate::transport::{BoxedReader, RequestBody};

const SPILL_BUFFER_SIZE: usize = 64 * 1024;

/// Body of a request before hashing.
pub enum Payload {
    /// No body.
    Empty,
    /// In-memory body.
    Bytes(Bytes),
    /// Streamed body of optionally known length.
    Reader {
        /// Body source.
        reader: BoxedReader,
        /// Length in bytes, when known.
        len: Option<u64>,
    },
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Reader { len, .. } => f.debug_struct("Reader").field("len", len).finish(),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<&'static [u8]> for Payload {
    fn from(value: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(value))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl Payload {
    /// Wrap an async reader.
    pub fn from_reader(reader: impl tokio::io::AsyncRead + Send + Unpin + 'static, len: Option<u64>) -> Self {
        Self::Reader {
            reader: Box::new(reader),
            len,
        }
    }

    /// Stream a whole local file.
    pub async fn from_file(path: impl AsRef<Path>) -> OosResult<Self> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok(Self::from_reader(file, Some(len)))
    }

    /// Stream `len` bytes of a local file starting at `offset`.
    pub async fn from_file_range(path: impl AsRef<Path>, offset: u64, len: u64) -> OosResult<Self> {
        let mut file = tokio::fs::File::open(path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        Ok(Self::from_reader(file.take(len), Some(len)))
    }

    /// Length in bytes, when known.
    #[must_use]
    pub fn len(&self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Bytes(b) => Some(b.len() as u64),
            Self::Reader { len, .. } => *len,
        }
    }

    /// Whether there is no body at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Which digests to compute while preparing a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPlan {
    /// Compute base64 MD5 for `Content-MD5`.
    pub md5: bool,
    /// Compute hex SHA-256 for `x-amz-content-sha256`.
    pub sha256: bool,
    /// Largest payload held in memory while hashing.
    pub memory_threshold: u64,
}

/// A payload ready to send, with the digests requested by its [`HashPlan`].
#[derive(Debug)]
pub struct PreparedBody {
    /// Body handed to the transport.
    pub body: RequestBody,
    /// Body length, when known.
    pub content_length: Option<u64>,
    /// Base64 MD5 digest.
    pub content_md5: Option<String>,
    /// Hex SHA-256 digest.
    pub content_sha256: Option<String>,
}

struct Hashers {
    md5: Option<md5::Md5>,
    sha256: Option<sha2::Sha256>,
}

impl Hashers {
    fn new(plan: HashPlan) -> Self {
        Self {
            md5: plan.md5.then(<md5::Md5 as Digest>::new),
            sha256: plan.sha256.then(<sha2::Sha256 as Digest>::new),
        }
    }

    fn update(&mut self, data: &[u8]) {
        if let Some(h) = self.md5.as_mut() {
            h.update(data);
        }
        if let Some(h) = self.sha256.as_mut() {
            h.update(data);
        }
    }

    fn finish(self) -> (Option<String>, Option<String>) {
        (
            self.md5.map(|h| BASE64_STANDARD.encode(h.finalize())),
            self.sha256.map(|h| hex::encode(h.finalize())),
        )
    }
}

/// Compute the requested digests, materializing or spilling the payload as
/// needed. Without digests the payload passes through untouched.
pub async fn prepare(payload: Payload, plan: HashPlan) -> OosResult<PreparedBody> {
    let content_length = payload.len();

    if payload.is_empty() || (!plan.md5 && !plan.sha256) {
        let body = match payload {
            Payload::Empty => RequestBody::Empty,
            Payload::Bytes(b) => RequestBody::Bytes(b),
            Payload::Reader { reader, len } => RequestBody::Stream { reader, len },
        };
        return Ok(PreparedBody {
            body,
            content_length,
            content_md5: None,
            content_sha256: None,
        });
    }

    let mut hashers = Hashers::new(plan);
    match payload {
        Payload::Bytes(bytes) => {
            hashers.update(&bytes);
            let (content_md5, content_sha256) = hashers.finish();
            Ok(PreparedBody {
                body: RequestBody::Bytes(bytes),
                content_length,
                content_md5,
                content_sha256,
            })
        }
        Payload::Reader {
            mut reader,
            len: Some(len),
        } if len > 0 && len <= plan.memory_threshold => {
            let capacity = usize::try_from(len).unwrap_or_default();
            let mut buf = Vec::with_capacity(capacity);
            reader.read_to_end(&mut buf).await?;
            hashers.update(&buf);
            let (content_md5, content_sha256) = hashers.finish();
            Ok(PreparedBody {
                content_length: Some(buf.len() as u64),
                body: RequestBody::Bytes(Bytes::from(buf)),
                content_md5,
                content_sha256,
            })
        }
        Payload::Reader { reader, len } => spill(reader, len, hashers).await,
        Payload::Empty => Ok(PreparedBody {
            body: RequestBody::Empty,
            content_length: Some(0),
            content_md5: None,
            content_sha256: None,
        }),
    }
}

/// Copy the payload into an anonymous temporary file while hashing it.
async fn spill(mut reader: BoxedReader, len: Option<u64>, mut hashers: Hashers) -> OosResult<PreparedBody> {
    let file = tokio::task::spawn_blocking(tempfile::tempfile)
        .await
        .map_err(std::io::Error::other)??;
    let mut file = tokio::fs::File::from_std(file);

    let mut buf = vec![0u8; SPILL_BUFFER_SIZE];
    let mut size = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hashers.update(&buf[..n]);
        file.write_all(&buf[..n]).await?;
        size += n as u64;
    }
    file.flush().await?;
    file.seek(SeekFrom::Start(0)).await?;

    if let Some(expected) = len.filter(|expected| *expected != size) {
        warn!(expected, actual = size, "payload length differs from declared length");
    }
    debug!(size, "spilled payload to temporary file for hashing");

    let (content_md5, content_sha256) = hashers.finish();
    Ok(PreparedBody {
        body: RequestBody::Stream {
            reader: Box::new(file),
            len: Some(size),
        },
        content_length: Some(size),
        content_md5,
        content_sha256,
    })
}
