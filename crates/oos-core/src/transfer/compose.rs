//! Assemble whole source objects into one destination object.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use http::HeaderMap;
use oos_model::{CompletedPart, ObjectStat};
use tracing::info;

use super::part::MAX_PART_COUNT;
use super::{MultipartTarget, TransferKind, TransferOptions, TransferPart, TransferPlan, remote_session, run_transfer};
use crate::client::Bucket;
use crate::error::{OosError, OosResult};

/// One source object and the part number it becomes in the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    /// Source bucket.
    pub bucket: String,
    /// Source key.
    pub key: String,
    /// Part number in the destination, at least 1.
    pub part_number: u32,
}

impl CopySource {
    /// Create a source.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, part_number: u32) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            part_number,
        }
    }
}

struct ComposeTarget {
    bucket: Bucket,
    dest_key: String,
    sources: BTreeMap<u32, CopySource>,
    headers: HeaderMap,
}

#[async_trait]
impl MultipartTarget for ComposeTarget {
    async fn initiate(&self) -> OosResult<String> {
        let session = self
            .bucket
            .initiate_multipart_upload(&self.dest_key, self.headers.clone())
            .await?;
        Ok(session.upload_id)
    }

    async fn transfer(&self, session_id: &str, part: TransferPart) -> OosResult<CompletedPart> {
        let source = self.sources.get(&part.number).ok_or_else(|| {
            OosError::InvalidParameter(format!("no source for part {}", part.number))
        })?;
        let session = remote_session(&self.bucket, &self.dest_key, session_id);
        self.bucket
            .upload_part_copy(&session, &source.bucket, &source.key, None, part.number)
            .await
    }

    async fn complete(&self, session_id: &str, parts: Vec<CompletedPart>) -> OosResult<()> {
        let session = remote_session(&self.bucket, &self.dest_key, session_id);
        self.bucket.complete_multipart_upload(&session, parts).await?;
        Ok(())
    }

    async fn abort(&self, session_id: &str) -> OosResult<()> {
        let session = remote_session(&self.bucket, &self.dest_key, session_id);
        self.bucket.abort_multipart_upload(&session).await
    }
}

fn validate_sources(sources: &[CopySource], dest_key: &str) -> OosResult<()> {
    if dest_key.is_empty() {
        return Err(OosError::InvalidParameter("destination key is empty".to_owned()));
    }
    if sources.is_empty() {
        return Err(OosError::InvalidParameter("no copy sources".to_owned()));
    }
    let mut seen = HashSet::with_capacity(sources.len());
    for source in sources {
        if source.bucket.is_empty() || source.key.is_empty() {
            return Err(OosError::InvalidParameter(format!(
                "copy source {source:?} has an empty bucket or key"
            )));
        }
        if source.part_number == 0 || u64::from(source.part_number) > MAX_PART_COUNT {
            return Err(OosError::InvalidParameter(format!(
                "copy source {}/{} has part number {} outside [1, {MAX_PART_COUNT}]",
                source.bucket, source.key, source.part_number
            )));
        }
        if !seen.insert(source.part_number) {
            return Err(OosError::InvalidParameter(format!(
                "part number {} is used twice",
                source.part_number
            )));
        }
    }
    Ok(())
}

impl Bucket {
    /// Build `dest_key` in this bucket from whole source objects, each copied
    /// as the part its [`CopySource`] names.
    ///
    /// Every source is stat'ed first; empty sources are rejected. This
    /// operation does not checkpoint.
    pub async fn copy_object_as_multipart(
        &self,
        sources: &[CopySource],
        dest_key: &str,
        options: &TransferOptions,
    ) -> OosResult<()> {
        validate_sources(sources, dest_key)?;

        let mut parts = Vec::with_capacity(sources.len());
        for source in sources {
            let stat = self.sibling(&source.bucket)?.object_stat(&source.key).await?;
            if stat.size == 0 {
                return Err(OosError::InvalidParameter(format!(
                    "copy source {}/{} is empty",
                    source.bucket, source.key
                )));
            }
            parts.push(TransferPart {
                number: source.part_number,
                start: 0,
                end: stat.size - 1,
            });
        }
        parts.sort_by_key(|part| part.number);
        info!(bucket = %self.name, dest_key, sources = sources.len(), "starting multipart compose");

        let target = ComposeTarget {
            bucket: self.clone(),
            dest_key: dest_key.to_owned(),
            sources: sources.iter().map(|s| (s.part_number, s.clone())).collect(),
            headers: options.initiate_headers.clone(),
        };
        let plan = TransferPlan {
            kind: TransferKind::Copy,
            source_bucket: String::new(),
            source_key: String::new(),
            source_stat: ObjectStat::default(),
            dest_bucket: self.name.clone(),
            dest_key: dest_key.to_owned(),
            parts,
        };
        run_transfer(target, plan, options, None).await?;
        Ok(())
    }
}
