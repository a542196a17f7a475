//! Server-side multipart copy.

use async_trait::async_trait;
use http::HeaderMap;
use oos_model::CompletedPart;
use tracing::info;

use super::part::{split_parts, validate_part_size};
use super::{
    MultipartTarget, TransferKind, TransferOptions, TransferPart, TransferPlan, object_url, remote_session,
    run_transfer,
};
use crate::client::Bucket;
use crate::error::{OosError, OosResult};

struct CopyTarget {
    bucket: Bucket,
    dest_key: String,
    src_bucket: String,
    src_key: String,
    headers: HeaderMap,
}

#[async_trait]
impl MultipartTarget for CopyTarget {
    async fn initiate(&self) -> OosResult<String> {
        let session = self
            .bucket
            .initiate_multipart_upload(&self.dest_key, self.headers.clone())
            .await?;
        Ok(session.upload_id)
    }

    async fn transfer(&self, session_id: &str, part: TransferPart) -> OosResult<CompletedPart> {
        let session = remote_session(&self.bucket, &self.dest_key, session_id);
        self.bucket
            .upload_part_copy(&session, &self.src_bucket, &self.src_key, Some(part.range()), part.number)
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

impl Bucket {
    /// Copy `src_bucket/src_key` into `dest_key` of this bucket, `part_size`
    /// bytes per `UploadPartCopy`.
    ///
    /// An empty source is rejected; use a plain copy for those.
    pub async fn copy_file(
        &self,
        src_bucket: &str,
        src_key: &str,
        dest_key: &str,
        part_size: u64,
        options: &TransferOptions,
    ) -> OosResult<()> {
        if src_key.is_empty() || dest_key.is_empty() {
            return Err(OosError::InvalidParameter("object key is empty".to_owned()));
        }
        validate_part_size(part_size)?;

        let source = self.sibling(src_bucket)?;
        let stat = source.object_stat(src_key).await?;
        if stat.size == 0 {
            return Err(OosError::InvalidParameter(format!(
                "source object {src_bucket}/{src_key} is empty"
            )));
        }
        let parts = split_parts(stat.size, part_size)?;
        info!(
            src_bucket,
            src_key,
            bucket = %self.name,
            dest_key,
            size = stat.size,
            parts = parts.len(),
            "starting multipart copy"
        );

        let checkpoint_path = options
            .checkpoint
            .as_ref()
            .map(|cp| cp.resolve(&object_url(src_bucket, src_key), &object_url(&self.name, dest_key)));
        let target = CopyTarget {
            bucket: self.clone(),
            dest_key: dest_key.to_owned(),
            src_bucket: src_bucket.to_owned(),
            src_key: src_key.to_owned(),
            headers: options.initiate_headers.clone(),
        };
        let plan = TransferPlan {
            kind: TransferKind::Copy,
            source_bucket: src_bucket.to_owned(),
            source_key: src_key.to_owned(),
            source_stat: stat,
            dest_bucket: self.name.clone(),
            dest_key: dest_key.to_owned(),
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

    use super::*;
    use crate::client::Client;
    use crate::object::X_AMZ_COPY_SOURCE_RANGE;
    use crate::test_support::{MockResponse, MockTransport, RecordedRequest, test_config};
    use crate::transfer::CheckpointConfig;
    use crate::transfer::part::MIN_PART_SIZE;

    const SIZE: u64 = 3 * MIN_PART_SIZE + 10;

    fn respond(req: &RecordedRequest, fail_range: Option<&str>) -> OosResult<MockResponse> {
        let response = match req.method {
            Method::HEAD => MockResponse::ok()
                .with_header("content-length", &SIZE.to_string())
                .with_header("etag", "\"src\"")
                .with_header("last-modified", "Fri, 01 Mar 2024 12:30:05 GMT"),
            Method::POST if req.query_param("uploads").is_some() => MockResponse::ok().with_body(
                "<InitiateMultipartUploadResult><Bucket>dest</Bucket><Key>copy.bin</Key><UploadId>u-1</UploadId></InitiateMultipartUploadResult>",
            ),
            Method::PUT if req.header(X_AMZ_COPY_SOURCE_RANGE) == fail_range => {
                MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR).with_body(
                    "<Error><Code>InternalError</Code><Message>boom</Message></Error>",
                )
            }
            Method::PUT => {
                let number = req.query_param("partNumber").unwrap_or_default();
                MockResponse::ok().with_body(format!(
                    "<CopyPartResult><ETag>\"p{number}\"</ETag></CopyPartResult>"
                ))
            }
            Method::POST => MockResponse::ok().with_body(
                "<CompleteMultipartUploadResult><ETag>\"done\"</ETag></CompleteMultipartUploadResult>",
            ),
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

    fn count(transport: &MockTransport, method: &Method) -> usize {
        transport.requests().iter().filter(|r| &r.method == method).count()
    }

    #[tokio::test]
    async fn test_should_copy_every_range_and_complete() {
        let transport = MockTransport::new(|req| respond(req, None));
        let options = TransferOptions::builder().routines(2).build();

        bucket(&transport)
            .copy_file("src", "big.bin", "copy.bin", MIN_PART_SIZE, &options)
            .await
            .unwrap();

        let requests = transport.requests();
        let mut ranges: Vec<_> = requests
            .iter()
            .filter_map(|r| r.header(X_AMZ_COPY_SOURCE_RANGE).map(ToOwned::to_owned))
            .collect();
        ranges.sort();
        assert_eq!(
            ranges,
            vec![
                "bytes=0-102399",
                "bytes=102400-204799",
                "bytes=204800-307199",
                "bytes=307200-307209",
            ]
        );

        let complete = requests
            .iter()
            .find(|r| r.method == Method::POST && r.query_param("uploadId").is_some())
            .unwrap();
        let body = String::from_utf8(complete.body.to_vec()).unwrap();
        assert!(body.contains("<PartNumber>4</PartNumber>"));
        assert!(body.contains("p4"));
        assert_eq!(count(&transport, &Method::DELETE), 0);
    }

    #[tokio::test]
    async fn test_should_abort_session_when_a_part_fails() {
        let transport = MockTransport::new(|req| respond(req, Some("bytes=102400-204799")));

        let err = bucket(&transport)
            .copy_file("src", "big.bin", "copy.bin", MIN_PART_SIZE, &TransferOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.service_code(), Some("InternalError"));
        assert_eq!(count(&transport, &Method::DELETE), 1);
        let deleted = transport
            .requests()
            .into_iter()
            .find(|r| r.method == Method::DELETE)
            .unwrap();
        assert_eq!(deleted.query_param("uploadId").as_deref(), Some("u-1"));
    }

    #[tokio::test]
    async fn test_should_keep_checkpoint_and_session_on_failure_then_resume() {
        let dir = tempfile::tempdir().unwrap();
        let options = TransferOptions::builder()
            .checkpoint(CheckpointConfig::Dir(dir.path().to_path_buf()))
            .build();
        let checkpoint = options
            .checkpoint
            .as_ref()
            .unwrap()
            .resolve("oos://src/big.bin", "oos://dest/copy.bin");

        let failing = MockTransport::new(|req| respond(req, Some("bytes=204800-307199")));
        assert!(
            bucket(&failing)
                .copy_file("src", "big.bin", "copy.bin", MIN_PART_SIZE, &options)
                .await
                .is_err()
        );
        assert_eq!(count(&failing, &Method::DELETE), 0);
        assert!(checkpoint.exists());

        let healthy = MockTransport::new(|req| respond(req, None));
        bucket(&healthy)
            .copy_file("src", "big.bin", "copy.bin", MIN_PART_SIZE, &options)
            .await
            .unwrap();

        let requests = healthy.requests();
        assert!(!requests.iter().any(|r| r.query_param("uploads").is_some()));
        let copied: Vec<_> = requests
            .iter()
            .filter_map(|r| r.header(X_AMZ_COPY_SOURCE_RANGE))
            .collect();
        assert_eq!(copied, vec!["bytes=204800-307199", "bytes=307200-307209"]);
        assert!(!checkpoint.exists());
    }

    #[tokio::test]
    async fn test_should_reject_empty_source_object() {
        let transport = MockTransport::new(|_| Ok(MockResponse::ok().with_header("content-length", "0")));
        let err = bucket(&transport)
            .copy_file("src", "empty", "copy", MIN_PART_SIZE, &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_parameter_error());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_should_reject_bad_part_size_before_io() {
        let transport = MockTransport::ok();
        let err = bucket(&transport)
            .copy_file("src", "k", "copy", 1024, &TransferOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_parameter_error());
        assert!(transport.requests().is_empty());
    }
}
