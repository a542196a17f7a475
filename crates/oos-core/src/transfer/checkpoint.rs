//! Multipart session state and its on-disk checkpoint.
//!
//! A checkpoint is a JSON document holding a [`MultipartSession`] together
//! with a snapshot of the transfer source. It is rewritten after every part
//! and removed once the transfer completes:
//!
//! ```json
//! {
//!   "magic": "84F1F18C-FF1D-403B-A1D8-9DEB5F65910A",
//!   "contentHash": "base64 md5 of this document with contentHash blank",
//!   "sourceBucket": "src",
//!   "sourceKey": "big.bin",
//!   "sourceObjectStat": { "size": 1048576, "lastModified": "...", "etag": "..." },
//!   "destBucket": "dest",
//!   "destKey": "big.bin",
//!   "sessionId": "upload id",
//!   "parts": [{ "number": 1, "start": 0, "end": 262143 }],
//!   "partResults": [{ "partNumber": 1, "etag": "\"...\"" }],
//!   "partDone": [true]
//! }
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use digest::Digest;
use oos_model::{CompletedPart, ObjectStat};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::part::TransferPart;
use crate::error::{OosError, OosResult};

/// The operation a checkpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Server-side multipart copy.
    Copy,
    /// Local file to object.
    Upload,
    /// Object to local file.
    Download,
}

impl TransferKind {
    /// Magic constant identifying checkpoints of this kind.
    #[must_use]
    pub fn magic(self) -> &'static str {
        match self {
            Self::Copy => "84F1F18C-FF1D-403B-A1D8-9DEB5F65910A",
            Self::Upload => "FE8BB4EA-B593-4FAC-AD7A-2459A36E2E62",
            Self::Download => "92611BED-89E2-46B6-89E5-72F273D4B0A3",
        }
    }
}

/// Parts of a transfer and how far each has got.
///
/// `parts`, `part_results` and `part_done` always have the same length; a
/// result is meaningful only when its done flag is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultipartSession {
    /// Destination bucket, empty for downloads.
    pub dest_bucket: String,
    /// Destination key, or the local path for downloads.
    pub dest_key: String,
    /// Remote session id, empty for downloads.
    pub session_id: String,
    /// Every part of the transfer.
    pub parts: Vec<TransferPart>,
    /// Result of each part, by position.
    pub part_results: Vec<CompletedPart>,
    /// Completion flag of each part, by position.
    pub part_done: Vec<bool>,
}

impl MultipartSession {
    /// A session with no part done yet.
    pub fn new(dest_bucket: impl Into<String>, dest_key: impl Into<String>, parts: Vec<TransferPart>) -> Self {
        let part_results = parts
            .iter()
            .map(|part| CompletedPart::new(part.number, String::new()))
            .collect();
        let part_done = vec![false; parts.len()];
        Self {
            dest_bucket: dest_bucket.into(),
            dest_key: dest_key.into(),
            session_id: String::new(),
            parts,
            part_results,
            part_done,
        }
    }

    /// Whether the three part lists line up.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.parts.len() == self.part_results.len() && self.parts.len() == self.part_done.len()
    }

    /// Parts still to transfer, in part order.
    #[must_use]
    pub fn todo_parts(&self) -> Vec<TransferPart> {
        self.parts
            .iter()
            .zip(&self.part_done)
            .filter(|(_, done)| !**done)
            .map(|(part, _)| *part)
            .collect()
    }

    /// Bytes already transferred.
    #[must_use]
    pub fn completed_bytes(&self) -> u64 {
        self.parts
            .iter()
            .zip(&self.part_done)
            .filter(|(_, done)| **done)
            .map(|(part, _)| part.size())
            .sum()
    }

    /// Whether every part is done.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.part_done.iter().all(|done| *done)
    }

    /// Record a finished part. Returns the size of the part, or `None` when
    /// the part number is not in the session.
    pub fn record(&mut self, result: CompletedPart) -> Option<u64> {
        let index = self
            .parts
            .iter()
            .position(|part| part.number == result.part_number)?;
        self.part_done[index] = true;
        self.part_results[index] = result;
        Some(self.parts[index].size())
    }

    /// Results of every part, sorted by part number.
    #[must_use]
    pub fn completed_parts(&self) -> Vec<CompletedPart> {
        let mut parts = self.part_results.clone();
        parts.sort_by_key(|part| part.part_number);
        parts
    }
}

/// A persisted [`MultipartSession`] with the identity of its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Kind marker, see [`TransferKind::magic`].
    pub magic: String,
    /// Base64 MD5 of the document with this field blank.
    pub content_hash: String,
    /// Source bucket, empty for uploads.
    pub source_bucket: String,
    /// Source key, or the local path for uploads.
    pub source_key: String,
    /// Source snapshot taken when the transfer started.
    pub source_object_stat: ObjectStat,
    /// Session state.
    #[serde(flatten)]
    pub session: MultipartSession,
}

impl Checkpoint {
    /// Wrap a session.
    pub fn new(
        kind: TransferKind,
        source_bucket: impl Into<String>,
        source_key: impl Into<String>,
        source_object_stat: ObjectStat,
        session: MultipartSession,
    ) -> Self {
        Self {
            magic: kind.magic().to_owned(),
            content_hash: String::new(),
            source_bucket: source_bucket.into(),
            source_key: source_key.into(),
            source_object_stat,
            session,
        }
    }

    /// Base64 MD5 of the JSON encoding with `content_hash` blank.
    pub fn compute_hash(&self) -> OosResult<String> {
        let mut unhashed = self.clone();
        unhashed.content_hash.clear();
        let json = serde_json::to_vec(&unhashed)?;
        Ok(BASE64_STANDARD.encode(md5::Md5::digest(&json)))
    }

    /// Read a checkpoint file. The content hash is checked; nothing else is.
    pub async fn load(path: &Path) -> OosResult<Self> {
        let data = tokio::fs::read(path).await?;
        let checkpoint: Self = serde_json::from_slice(&data)?;
        if checkpoint.compute_hash()? != checkpoint.content_hash {
            return Err(OosError::InvalidCheckpoint("content hash mismatch".to_owned()));
        }
        Ok(checkpoint)
    }

    /// Write the checkpoint atomically: a temporary file in the same
    /// directory is renamed over `path`. The write runs on the blocking pool.
    pub async fn dump(&mut self, path: &Path) -> OosResult<()> {
        self.content_hash = self.compute_hash()?;
        let json = serde_json::to_vec(self)?;
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| OosError::Io(std::io::Error::other(e)))?
    }

    /// Check that the checkpoint belongs to this transfer and that its source
    /// has not changed since it was written.
    pub fn validate(
        &self,
        kind: TransferKind,
        source_object_stat: &ObjectStat,
        dest_bucket: &str,
        dest_key: &str,
    ) -> OosResult<()> {
        let fail = |reason: &str| Err(OosError::InvalidCheckpoint(reason.to_owned()));
        if self.magic != kind.magic() {
            return fail("magic does not match the transfer kind");
        }
        if self.compute_hash()? != self.content_hash {
            return fail("content hash mismatch");
        }
        if &self.source_object_stat != source_object_stat {
            return fail("source changed since the checkpoint was written");
        }
        if self.session.dest_bucket != dest_bucket || self.session.dest_key != dest_key {
            return fail("destination differs");
        }
        if !self.session.is_consistent() {
            return fail("part lists differ in length");
        }
        Ok(())
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> OosResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| OosError::Io(e.error))?;
    Ok(())
}

/// Sink for session snapshots taken while a transfer runs.
#[async_trait]
pub trait SessionStore: Send {
    /// Persist the current session.
    async fn save(&mut self, session: &MultipartSession) -> OosResult<()>;

    /// Forget the session after success.
    async fn clear(&mut self) -> OosResult<()>;
}

/// [`SessionStore`] writing a [`Checkpoint`] file.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    checkpoint: Checkpoint,
}

impl CheckpointStore {
    /// A store writing `checkpoint` to `path`.
    #[must_use]
    pub fn new(path: PathBuf, checkpoint: Checkpoint) -> Self {
        Self { path, checkpoint }
    }

    /// Load the checkpoint at `path` if it is valid for this transfer.
    ///
    /// A missing file yields `None`. An unreadable, corrupt or stale one is
    /// deleted and also yields `None`.
    pub async fn resume(
        path: &Path,
        kind: TransferKind,
        source_object_stat: &ObjectStat,
        dest_bucket: &str,
        dest_key: &str,
    ) -> Option<Checkpoint> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return None;
        }
        let loaded = Checkpoint::load(path).await.and_then(|checkpoint| {
            checkpoint.validate(kind, source_object_stat, dest_bucket, dest_key)?;
            Ok(checkpoint)
        });
        match loaded {
            Ok(checkpoint) => {
                debug!(
                    path = %path.display(),
                    done = checkpoint.session.part_done.iter().filter(|d| **d).count(),
                    total = checkpoint.session.parts.len(),
                    "resuming from checkpoint"
                );
                Some(checkpoint)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "discarding checkpoint");
                discard(path).await;
                None
            }
        }
    }
}

#[async_trait]
impl SessionStore for CheckpointStore {
    async fn save(&mut self, session: &MultipartSession) -> OosResult<()> {
        self.checkpoint.session.clone_from(session);
        self.checkpoint.dump(&self.path).await
    }

    async fn clear(&mut self) -> OosResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// Remove a checkpoint file, logging failures.
pub(crate) async fn discard(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "failed to remove checkpoint");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::part::split_parts;

    fn stat() -> ObjectStat {
        ObjectStat {
            size: 1_048_576,
            last_modified: "Fri, 01 Mar 2024 12:30:05 GMT".to_owned(),
            etag: "\"abc\"".to_owned(),
        }
    }

    fn checkpoint() -> Checkpoint {
        let parts = split_parts(1_048_576, 262_144).unwrap();
        let mut session = MultipartSession::new("dest", "copy.bin", parts);
        session.session_id = "u-1".to_owned();
        session.record(CompletedPart::new(2, "\"p2\""));
        Checkpoint::new(TransferKind::Copy, "src", "big.bin", stat(), session)
    }

    #[tokio::test]
    async fn test_should_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copy.cp");
        let mut original = checkpoint();
        original.dump(&path).await.unwrap();

        let loaded = Checkpoint::load(&path).await.unwrap();
        assert_eq!(loaded, original);
        loaded
            .validate(TransferKind::Copy, &stat(), "dest", "copy.bin")
            .unwrap();
    }

    #[test]
    fn test_should_use_camel_case_document_fields() {
        let mut cp = checkpoint();
        cp.content_hash = cp.compute_hash().unwrap();
        let json: serde_json::Value = serde_json::to_value(&cp).unwrap();
        for field in [
            "magic",
            "contentHash",
            "sourceBucket",
            "sourceKey",
            "sourceObjectStat",
            "destBucket",
            "destKey",
            "sessionId",
            "parts",
            "partResults",
            "partDone",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["sourceObjectStat"]["lastModified"], stat().last_modified);
    }

    #[tokio::test]
    async fn test_should_reject_corrupted_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copy.cp");
        checkpoint().dump(&path).await.unwrap();

        let mut data = std::fs::read(&path).unwrap();
        let idx = data
            .windows(3)
            .position(|w| w == b"u-1")
            .unwrap();
        data[idx + 2] = b'2';
        std::fs::write(&path, &data).unwrap();

        assert!(matches!(
            Checkpoint::load(&path).await,
            Err(OosError::InvalidCheckpoint(_))
        ));
    }

    #[test]
    fn test_should_reject_source_drift_and_foreign_kind() {
        let mut cp = checkpoint();
        cp.content_hash = cp.compute_hash().unwrap();

        let mut changed = stat();
        changed.etag = "\"def\"".to_owned();
        assert!(cp.validate(TransferKind::Copy, &changed, "dest", "copy.bin").is_err());
        assert!(cp.validate(TransferKind::Upload, &stat(), "dest", "copy.bin").is_err());
        assert!(cp.validate(TransferKind::Copy, &stat(), "dest", "other.bin").is_err());
    }

    #[test]
    fn test_should_list_exactly_the_undone_parts() {
        let parts = split_parts(10 * 262_144, 262_144).unwrap();
        let mut session = MultipartSession::new("dest", "k", parts.clone());
        for number in [1, 4, 7] {
            session.record(CompletedPart::new(number, format!("e{number}")));
        }

        let todo = session.todo_parts();
        assert_eq!(todo.len(), 7);
        assert!(todo.iter().all(|part| parts.contains(part)));
        assert!(todo.iter().all(|part| ![1, 4, 7].contains(&part.number)));
        assert_eq!(session.completed_bytes(), 3 * 262_144);
    }

    #[tokio::test]
    async fn test_should_discard_stale_checkpoint_on_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copy.cp");
        checkpoint().dump(&path).await.unwrap();

        let mut changed = stat();
        changed.size += 1;
        let resumed = CheckpointStore::resume(&path, TransferKind::Copy, &changed, "dest", "copy.bin").await;
        assert!(resumed.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_should_resume_matching_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copy.cp");
        assert!(CheckpointStore::resume(&path, TransferKind::Copy, &stat(), "dest", "copy.bin").await.is_none());

        checkpoint().dump(&path).await.unwrap();
        let resumed = CheckpointStore::resume(&path, TransferKind::Copy, &stat(), "dest", "copy.bin")
            .await
            .unwrap();
        assert_eq!(resumed.session.session_id, "u-1");
        assert_eq!(resumed.session.todo_parts().len(), 3);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_should_remove_file_on_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copy.cp");
        let cp = checkpoint();
        let session = cp.session.clone();
        let mut store = CheckpointStore::new(path.clone(), cp);

        store.save(&session).await.unwrap();
        assert!(path.exists());
        store.clear().await.unwrap();
        assert!(!path.exists());
        store.clear().await.unwrap();
    }
}
