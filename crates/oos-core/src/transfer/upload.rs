//! Multipart upload of a local file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use oos_model::{CompletedPart, ObjectStat};
use tracing::info;

use super::part::{split_parts, validate_part_size};
use super::{
    MultipartTarget, TransferKind, TransferOptions, TransferPart, TransferPlan, object_url, remote_session,
    run_transfer,
};
use crate::body::Payload;
use crate::client::Bucket;
use crate::error::{OosError, OosResult};

struct UploadTarget {
    bucket: Bucket,
    key: String,
    path: PathBuf,
    headers: HeaderMap,
}

#[async_trait]
impl MultipartTarget for UploadTarget {
    async fn initiate(&self) -> OosResult<String> {
        let session = self
            .bucket
            .initiate_multipart_upload(&self.key, self.headers.clone())
            .await?;
        Ok(session.upload_id)
    }

    async fn transfer(&self, session_id: &str, part: TransferPart) -> OosResult<CompletedPart> {
        let session = remote_session(&self.bucket, &self.key, session_id);
        let payload = Payload::from_file_range(&self.path, part.start, part.size()).await?;
        self.bucket.upload_part(&session, part.number, payload).await
    }

    async fn complete(&self, session_id: &str, parts: Vec<CompletedPart>) -> OosResult<()> {
        let session = remote_session(&self.bucket, &self.key, session_id);
        self.bucket.complete_multipart_upload(&session, parts).await?;
        Ok(())
    }

    async fn abort(&self, session_id: &str) -> OosResult<()> {
        let session = remote_session(&self.bucket, &self.key, session_id);
        self.bucket.abort_multipart_upload(&session).await
    }
}

/// Snapshot of a local file: size, mtime as RFC 3339 and an empty ETag.
async fn local_stat(path: &Path) -> OosResult<ObjectStat> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(OosError::InvalidParameter(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    let modified: DateTime<Utc> = metadata.modified()?.into();
    Ok(ObjectStat {
        size: metadata.len(),
        last_modified: modified.to_rfc3339(),
        etag: String::new(),
    })
}

impl Bucket {
    /// Upload the file at `path` to `key`, `part_size` bytes per part.
    ///
    /// An empty file is stored with a single `PUT`.
    pub async fn upload_file(
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

        let stat = local_stat(path).await?;
        if stat.size == 0 {
            self.put_object(key, Payload::Empty, options.initiate_headers.clone())
                .await?;
            return Ok(());
        }
        let parts = split_parts(stat.size, part_size)?;
        info!(
            path = %path.display(),
            bucket = %self.name,
            key,
            size = stat.size,
            parts = parts.len(),
            "starting multipart upload"
        );

        let source = path.to_string_lossy().into_owned();
        let checkpoint_path = options
            .checkpoint
            .as_ref()
            .map(|cp| cp.resolve(&source, &object_url(&self.name, key)));
        let target = UploadTarget {
            bucket: self.clone(),
            key: key.to_owned(),
            path: path.to_path_buf(),
            headers: options.initiate_headers.clone(),
        };
        let plan = TransferPlan {
            kind: TransferKind::Upload,
            source_bucket: String::new(),
            source_key: source,
            source_stat: stat,
            dest_bucket: self.name.clone(),
            dest_key: key.to_owned(),
            parts,
        };
        run_transfer(target, plan, options, checkpoint_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::{Method, StatusCode};
    use parking_lot::Mutex;

    use super::*;
    use crate::client::Client;
    use crate::test_support::{MockResponse, MockTransport, RecordedRequest, test_config};
    use crate::transfer::part::MIN_PART_SIZE;
    use crate::transfer::{ProgressEvent, ProgressEventKind, ProgressListener};

    fn respond(req: &RecordedRequest) -> OosResult<MockResponse> {
        let response = match req.method {
            Method::POST if req.query_param("uploads").is_some() => MockResponse::ok().with_body(
                "<InitiateMultipartUploadResult><Bucket>dest</Bucket><Key>up.bin</Key><UploadId>u-9</UploadId></InitiateMultipartUploadResult>",
            ),
            Method::PUT => {
                let number = req.query_param("partNumber").unwrap_or_default();
                MockResponse::ok().with_header("etag", &format!("\"e{number}\""))
            }
            Method::POST => MockResponse::ok(),
            Method::DELETE => MockResponse::new(StatusCode::NO_CONTENT),
            _ => MockResponse::new(StatusCode::METHOD_NOT_ALLOWED),
        };
        Ok(response)
    }

    fn bucket(transport: &Arc<MockTransport>) -> Bucket {
        Client::with_transport(test_config(), transport.clone())
            .unwrap()
            .bucket("dest")
            .unwrap()
    }

    fn file_with(len: usize) -> (tempfile::TempDir, PathBuf, Vec<u8>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.bin");
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();
        (dir, path, data)
    }

    #[derive(Debug, Default)]
    struct Events(Mutex<Vec<ProgressEvent>>);

    impl ProgressListener for Events {
        fn on_progress(&self, event: &ProgressEvent) {
            self.0.lock().push(*event);
        }
    }

    #[tokio::test]
    async fn test_should_upload_file_slices_in_parts() {
        let len = 2 * MIN_PART_SIZE as usize + 17;
        let (_dir, path, data) = file_with(len);
        let transport = MockTransport::new(respond);
        let events = Arc::new(Events::default());
        let options = TransferOptions::builder()
            .routines(3)
            .listener(events.clone() as Arc<dyn ProgressListener>)
            .build();

        bucket(&transport)
            .upload_file("up.bin", &path, MIN_PART_SIZE, &options)
            .await
            .unwrap();

        let mut parts: Vec<_> = transport
            .requests()
            .into_iter()
            .filter(|r| r.method == Method::PUT)
            .collect();
        parts.sort_by_key(|r| r.query_param("partNumber").unwrap().parse::<u32>().unwrap());
        assert_eq!(parts.len(), 3);
        let rebuilt: Vec<u8> = parts.iter().flat_map(|r| r.body.to_vec()).collect();
        assert_eq!(rebuilt, data);
        assert!(parts.iter().all(|r| r.query_param("uploadId").as_deref() == Some("u-9")));

        let events = events.0.lock().clone();
        assert_eq!(events.first().unwrap().kind, ProgressEventKind::Started);
        let last = events.last().unwrap();
        assert_eq!(last.kind, ProgressEventKind::Completed);
        assert_eq!(last.consumed_bytes, len as u64);
        assert_eq!(last.total_bytes, len as u64);
    }

    #[tokio::test]
    async fn test_should_put_empty_file_in_one_request() {
        let (_dir, path, _) = file_with(0);
        let transport = MockTransport::new(respond);

        bucket(&transport)
            .upload_file("empty", &path, MIN_PART_SIZE, &TransferOptions::default())
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::PUT);
        assert!(requests[0].query_param("uploadId").is_none());
        assert!(requests[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_should_record_local_file_stat() {
        let (_dir, path, _) = file_with(42);
        let stat = local_stat(&path).await.unwrap();
        assert_eq!(stat.size, 42);
        assert!(stat.etag.is_empty());
        assert!(DateTime::parse_from_rfc3339(&stat.last_modified).is_ok());
    }

    #[tokio::test]
    async fn test_should_reject_directory_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::ok();
        let bucket = bucket(&transport);

        let err = bucket
            .upload_file("k", dir.path(), MIN_PART_SIZE, &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_parameter_error());

        let err = bucket
            .upload_file("k", dir.path().join("missing"), MIN_PART_SIZE, &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OosError::Io(_)));
        assert!(transport.requests().is_empty());
    }
}
