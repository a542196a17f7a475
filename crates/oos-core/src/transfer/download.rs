//! Multipart download to a local file.
//!
//! Parts are fetched with ranged `GET`s and written at their offsets into
//! `<path>.temp`, which is renamed over `path` once every part is in. There is
//! no remote session.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use http::StatusCode;
use http::header::{CONTENT_LENGTH, ETAG};
use oos_model::CompletedPart;
use tokio::io::AsyncSeekExt;
use tracing::{debug, info};

use super::checkpoint::discard;
use super::part::{split_parts, validate_part_size};
use super::{MultipartTarget, TransferKind, TransferOptions, TransferPart, TransferPlan, object_url, run_transfer};
use crate::client::Bucket;
use crate::error::{OosError, OosResult};
use crate::object::temp_file_path;

struct DownloadTarget {
    bucket: Bucket,
    key: String,
    path: PathBuf,
    temp: PathBuf,
    size: u64,
}

#[async_trait]
impl MultipartTarget for DownloadTarget {
    async fn initiate(&self) -> OosResult<String> {
        let file = tokio::fs::File::create(&self.temp).await?;
        file.set_len(self.size).await?;
        Ok(String::new())
    }

    async fn transfer(&self, _session_id: &str, part: TransferPart) -> OosResult<CompletedPart> {
        let response = self.bucket.get_object(&self.key, Some(part.range())).await?;
        // A server that ignores Range would overwrite neighbouring parts.
        if response.status != StatusCode::PARTIAL_CONTENT {
            return Err(OosError::UnexpectedStatusCode {
                allowed: vec![StatusCode::PARTIAL_CONTENT.as_u16()],
                got: response.status.as_u16(),
            });
        }
        let declared = response
            .header(CONTENT_LENGTH.as_str())
            .and_then(|len| len.parse::<u64>().ok());
        if let Some(declared) = declared.filter(|len| *len != part.size()) {
            return Err(OosError::UnexpectedContentLength {
                expected: part.size(),
                actual: declared,
            });
        }
        let etag = response.header(ETAG.as_str()).unwrap_or_default().to_owned();

        let mut file = tokio::fs::OpenOptions::new().write(true).open(&self.temp).await?;
        file.seek(SeekFrom::Start(part.start)).await?;
        let written = response.body.write_to(&mut file).await?;
        if written != part.size() {
            return Err(OosError::UnexpectedContentLength {
                expected: part.size(),
                actual: written,
            });
        }
        Ok(CompletedPart::new(part.number, etag))
    }

    async fn complete(&self, _session_id: &str, _parts: Vec<CompletedPart>) -> OosResult<()> {
        tokio::fs::rename(&self.temp, &self.path).await?;
        Ok(())
    }

    async fn abort(&self, _session_id: &str) -> OosResult<()> {
        match tokio::fs::remove_file(&self.temp).await {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

impl Bucket {
    /// Download `key` into the file at `path`, `part_size` bytes per ranged
    /// `GET`.
    ///
    /// An empty object yields an empty file.
    pub async fn download_file(
        &self,
        key: &str,
        path: impl AsRef<Path>,
        part_size: u64,
        options: &TransferOptions,
    ) -> OosResult<()> {
        let path = path.as_ref();
        if key.is_empty() {
            return Err(OosError::InvalidParameter("object key is empty".to_owned()));
        }
        validate_part_size(part_size)?;

        let stat = self.object_stat(key).await?;
        if stat.size == 0 {
            tokio::fs::File::create(path).await?;
            return Ok(());
        }
        let parts = split_parts(stat.size, part_size)?;
        info!(
            bucket = %self.name,
            key,
            path = %path.display(),
            size = stat.size,
            parts = parts.len(),
            "starting multipart download"
        );

        let temp = temp_file_path(path);
        let dest = path.to_string_lossy().into_owned();
        let checkpoint_path = options
            .checkpoint
            .as_ref()
            .map(|cp| cp.resolve(&object_url(&self.name, key), &dest));
        if let Some(cp) = &checkpoint_path {
            let checkpointed = tokio::fs::try_exists(cp).await.unwrap_or(false);
            if checkpointed && !tokio::fs::try_exists(&temp).await.unwrap_or(false) {
                debug!(checkpoint = %cp.display(), "partial download is gone, restarting");
                discard(cp).await;
            }
        }

        let target = DownloadTarget {
            bucket: self.clone(),
            key: key.to_owned(),
            path: path.to_path_buf(),
            temp,
            size: stat.size,
        };
        let plan = TransferPlan {
            kind: TransferKind::Download,
            source_bucket: self.name.clone(),
            source_key: key.to_owned(),
            source_stat: stat,
            dest_bucket: String::new(),
            dest_key: dest,
            parts,
        };
        run_transfer(target, plan, options, checkpoint_path).await?;
        Ok(())
    }
}
