//! Object and presigned URL integration tests.

#[cfg(test)]
mod tests {
    use http::{HeaderMap, Method};
    use oos_core::{ByteRange, OosError, QueryParams};

    use crate::{cleanup, test_bucket, test_key};

    #[tokio::test]
    #[ignore = "requires OOS credentials"]
    async fn test_should_put_stat_get_and_delete_object() -> anyhow::Result<()> {
        let bucket = test_bucket()?;
        let key = test_key("object");

        let etag = bucket
            .put_object(&key, b"hello, oos!".to_vec(), HeaderMap::new())
            .await?;
        assert!(!etag.is_empty());

        let stat = bucket.object_stat(&key).await?;
        assert_eq!(stat.size, 11);
        assert_eq!(stat.etag, etag);

        let body = bucket
            .get_object(&key, Some(ByteRange::new(7, 9)))
            .await?
            .body
            .collect()
            .await?;
        assert_eq!(body.as_ref(), b"oos");

        bucket.delete_object(&key).await?;
        let err = bucket.object_stat(&key).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires OOS credentials"]
    async fn test_should_surface_missing_key_as_service_error() -> anyhow::Result<()> {
        let bucket = test_bucket()?;
        let err = bucket
            .get_object(&test_key("missing"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OosError::Service { status: 404, .. }));
        assert_eq!(err.service_code(), Some("NoSuchKey"));
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires OOS credentials"]
    async fn test_should_round_trip_through_presigned_urls() -> anyhow::Result<()> {
        let bucket = test_bucket()?;
        let key = test_key("presigned");

        let put_url = bucket.sign_url(&key, &Method::PUT, 300, QueryParams::new(), &HeaderMap::new())?;
        bucket
            .put_object_with_url(&put_url, b"signed body".to_vec(), HeaderMap::new())
            .await?;

        let get_url = bucket.sign_url(&key, &Method::GET, 300, QueryParams::new(), &HeaderMap::new())?;
        let body = reqwest::get(&get_url).await?.error_for_status()?.bytes().await?;
        assert_eq!(body.as_ref(), b"signed body");

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("presigned.txt");
        let written = bucket.get_object_to_file_with_url(&get_url, &path).await?;
        assert_eq!(written, 11);

        cleanup(&bucket, &[&key]).await;
        Ok(())
    }
}
