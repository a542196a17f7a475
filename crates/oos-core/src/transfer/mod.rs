//! Resumable multipart transfers.
//!
//! Large objects are moved as independently transferred parts driven by the
//! [`engine`]. Four operations are built on it, all as methods of
//! [`Bucket`](crate::Bucket):
//!
//! - [`copy_file`](crate::Bucket::copy_file): server-side copy, one
//!   `UploadPartCopy` per range.
//! - [`upload_file`](crate::Bucket::upload_file): local file to object.
//! - [`download_file`](crate::Bucket::download_file): object to local file.
//! - [`copy_object_as_multipart`](crate::Bucket::copy_object_as_multipart):
//!   assemble whole source objects into one destination object.
//!
//! The first three can checkpoint their progress so an interrupted transfer
//! picks up where it stopped.

pub mod checkpoint;
mod compose;
mod copy;
mod download;
pub mod engine;
pub mod part;
pub mod progress;
mod upload;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use digest::Digest;
use http::HeaderMap;
use oos_model::{InitiateMultipartUploadResult, ObjectStat};
use typed_builder::TypedBuilder;

pub use self::checkpoint::{Checkpoint, CheckpointStore, MultipartSession, SessionStore, TransferKind};
pub use self::compose::CopySource;
pub use self::engine::{
    MultipartTarget, NoopInterceptor, PartInterceptor, SessionStart, TransferEngine, TransferState,
};
pub use self::part::TransferPart;
pub use self::progress::{ProgressEvent, ProgressEventKind, ProgressListener};
use crate::client::Bucket;
use crate::error::OosResult;

/// Extension of checkpoint files named after their transfer.
pub const CHECKPOINT_SUFFIX: &str = ".cp";

/// Where a transfer keeps its checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointConfig {
    /// This exact file.
    File(PathBuf),
    /// A file in this directory, named after the source and destination.
    Dir(PathBuf),
}

impl CheckpointConfig {
    /// Checkpoint path for a transfer from `source` to `dest`.
    ///
    /// In a directory the name is `hex(md5(source))-hex(md5(dest)).cp`.
    #[must_use]
    pub fn resolve(&self, source: &str, dest: &str) -> PathBuf {
        match self {
            Self::File(path) => path.clone(),
            Self::Dir(dir) => {
                let source = hex::encode(md5::Md5::digest(source.as_bytes()));
                let dest = hex::encode(md5::Md5::digest(dest.as_bytes()));
                dir.join(format!("{source}-{dest}{CHECKPOINT_SUFFIX}"))
            }
        }
    }
}

/// Knobs shared by the multipart transfer operations.
///
/// # Examples
///
/// ```
/// use oos_core::transfer::{CheckpointConfig, TransferOptions};
///
/// let options = TransferOptions::builder()
///     .routines(4)
///     .checkpoint(CheckpointConfig::Dir("/tmp/oos-cp".into()))
///     .build();
/// assert_eq!(options.routines, 4);
/// assert_eq!(TransferOptions::default().routines, 1);
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct TransferOptions {
    /// Concurrent part operations, clamped to `1..=100`.
    #[builder(default = 1)]
    pub routines: usize,

    /// Checkpoint location; `None` disables resume.
    #[builder(default, setter(strip_option))]
    pub checkpoint: Option<CheckpointConfig>,

    /// Extra headers sent when the multipart session is initiated.
    #[builder(default)]
    pub initiate_headers: HeaderMap,

    /// Hook run before every part.
    #[builder(default = Arc::new(NoopInterceptor) as Arc<dyn PartInterceptor>)]
    pub interceptor: Arc<dyn PartInterceptor>,

    /// Progress receiver.
    #[builder(default, setter(strip_option))]
    pub listener: Option<Arc<dyn ProgressListener>>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Identity of one transfer, used to build and validate its checkpoint.
#[derive(Debug)]
pub(crate) struct TransferPlan {
    pub kind: TransferKind,
    pub source_bucket: String,
    pub source_key: String,
    pub source_stat: ObjectStat,
    pub dest_bucket: String,
    pub dest_key: String,
    pub parts: Vec<TransferPart>,
}

/// Run `target` over `plan`, resuming from and maintaining the checkpoint at
/// `checkpoint_path` when one is given.
pub(crate) async fn run_transfer<T: MultipartTarget>(
    target: T,
    plan: TransferPlan,
    options: &TransferOptions,
    checkpoint_path: Option<PathBuf>,
) -> OosResult<MultipartSession> {
    let engine = TransferEngine::new(target, options.routines)
        .with_interceptor(Arc::clone(&options.interceptor))
        .with_listener(options.listener.clone());

    let Some(path) = checkpoint_path else {
        let session = MultipartSession::new(plan.dest_bucket, plan.dest_key, plan.parts);
        return engine.run(SessionStart::Fresh(session), None).await;
    };

    ensure_parent_dir(&path).await?;
    let resumed = CheckpointStore::resume(
        &path,
        plan.kind,
        &plan.source_stat,
        &plan.dest_bucket,
        &plan.dest_key,
    )
    .await;
    let (start, checkpoint) = match resumed {
        Some(checkpoint) => (SessionStart::Resume(checkpoint.session.clone()), checkpoint),
        None => {
            let session = MultipartSession::new(plan.dest_bucket, plan.dest_key, plan.parts);
            let checkpoint = Checkpoint::new(
                plan.kind,
                plan.source_bucket,
                plan.source_key,
                plan.source_stat,
                session.clone(),
            );
            (SessionStart::Fresh(session), checkpoint)
        }
    };
    let mut store = CheckpointStore::new(path, checkpoint);
    engine.run(start, Some(&mut store)).await
}

async fn ensure_parent_dir(path: &Path) -> OosResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// `oos://bucket/key`, the name of an object in checkpoint file names.
pub(crate) fn object_url(bucket: &str, key: &str) -> String {
    format!("oos://{bucket}/{key}")
}

/// The remote session handle for `upload_id` on `bucket`/`key`.
pub(crate) fn remote_session(bucket: &Bucket, key: &str, upload_id: &str) -> InitiateMultipartUploadResult {
    InitiateMultipartUploadResult {
        bucket: bucket.name().to_owned(),
        key: key.to_owned(),
        upload_id: upload_id.to_owned(),
    }
}
