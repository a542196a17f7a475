//! Multipart transfer integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use oos_core::transfer::TransferPart;
    use oos_core::{CheckpointConfig, CopySource, OosError, OosResult, PartInterceptor, TransferOptions};

    use crate::{cleanup, pattern_file, test_bucket, test_key};

    const PART: u64 = 100 * 1024;

    /// Fails the first attempt at one part number.
    #[derive(Debug)]
    struct FailOnce {
        part: u32,
        tripped: AtomicU32,
    }

    impl PartInterceptor for FailOnce {
        fn intercept(&self, part: &TransferPart) -> OosResult<()> {
            if part.number == self.part && self.tripped.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(OosError::Interrupted(format!("injected failure at part {}", part.number)));
            }
            Ok(())
        }
    }

    #[tokio::test]
    #[ignore = "requires OOS credentials"]
    async fn test_should_upload_copy_and_download_large_file() -> anyhow::Result<()> {
        let bucket = test_bucket()?;
        let dir = tempfile::tempdir()?;
        let (src, data) = pattern_file(dir.path(), "src.bin", 5 * PART as usize + 321)?;
        let uploaded = test_key("upload");
        let copied = test_key("copy");
        let options = TransferOptions::builder().routines(3).build();

        bucket.upload_file(&uploaded, &src, PART, &options).await?;
        assert_eq!(bucket.object_stat(&uploaded).await?.size, data.len() as u64);

        bucket
            .copy_file(bucket.name(), &uploaded, &copied, PART, &options)
            .await?;

        let out = dir.path().join("out.bin");
        bucket.download_file(&copied, &out, PART, &options).await?;
        assert_eq!(std::fs::read(&out)?, data);

        cleanup(&bucket, &[&uploaded, &copied]).await;
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires OOS credentials"]
    async fn test_should_resume_interrupted_upload_from_checkpoint() -> anyhow::Result<()> {
        let bucket = test_bucket()?;
        let dir = tempfile::tempdir()?;
        let (src, data) = pattern_file(dir.path(), "src.bin", 4 * PART as usize + 1)?;
        let key = test_key("resume");
        let options = TransferOptions::builder()
            .checkpoint(CheckpointConfig::Dir(dir.path().join("cp")))
            .interceptor(Arc::new(FailOnce {
                part: 3,
                tripped: AtomicU32::new(0),
            }))
            .build();

        let err = bucket.upload_file(&key, &src, PART, &options).await.unwrap_err();
        assert!(matches!(err, OosError::Interrupted(_)));
        assert_eq!(std::fs::read_dir(dir.path().join("cp"))?.count(), 1);

        bucket.upload_file(&key, &src, PART, &options).await?;
        assert_eq!(bucket.object_stat(&key).await?.size, data.len() as u64);
        assert_eq!(std::fs::read_dir(dir.path().join("cp"))?.count(), 0);

        cleanup(&bucket, &[&key]).await;
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires OOS credentials"]
    async fn test_should_compose_objects_in_part_order() -> anyhow::Result<()> {
        let bucket = test_bucket()?;
        let dir = tempfile::tempdir()?;
        let (first, first_data) = pattern_file(dir.path(), "a.bin", PART as usize)?;
        let (second, second_data) = pattern_file(dir.path(), "b.bin", 2 * PART as usize)?;
        let (a, b, joined) = (test_key("a"), test_key("b"), test_key("joined"));
        bucket
            .put_object_from_file(&a, &first, http::HeaderMap::new())
            .await?;
        bucket
            .put_object_from_file(&b, &second, http::HeaderMap::new())
            .await?;

        let sources = [
            CopySource::new(bucket.name(), &b, 2),
            CopySource::new(bucket.name(), &a, 1),
        ];
        bucket
            .copy_object_as_multipart(&sources, &joined, &TransferOptions::default())
            .await?;

        let out = dir.path().join("joined.bin");
        bucket.get_object_to_file(&joined, &out).await?;
        let mut expected = first_data;
        expected.extend_from_slice(&second_data);
        assert_eq!(std::fs::read(&out)?, expected);

        cleanup(&bucket, &[&a, &b, &joined]).await;
        Ok(())
    }
}
