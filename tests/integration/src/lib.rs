//! Integration tests against a live OOS endpoint.
//!
//! The client is configured from the `OOS_*` environment variables (see
//! `ClientConfig::from_env`) and the tests write under a scratch bucket named
//! by `OOS_TEST_BUCKET`. They are marked `#[ignore]` so they don't run during
//! normal `cargo test`.
//!
//! Run them with:
//! ```text
//! OOS_ENDPOINT=https://oos-cn.ctyunapi.cn OOS_ACCESS_KEY_ID=... \
//! OOS_SECRET_ACCESS_KEY=... OOS_TEST_BUCKET=scratch \
//! cargo test -p oos-integration -- --ignored
//! ```

use std::path::{Path, PathBuf};
use std::sync::Once;

use oos_core::{Bucket, Client, ClientConfig};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,oos_core=debug")),
            )
            .with_test_writer()
            .init();
    });
}

/// Create a client from the environment.
pub fn client() -> anyhow::Result<Client> {
    init_tracing();
    Ok(Client::new(ClientConfig::from_env())?)
}

/// Handle to the scratch bucket.
pub fn test_bucket() -> anyhow::Result<Bucket> {
    let name = std::env::var("OOS_TEST_BUCKET").unwrap_or_else(|_| "oos-rust-sdk-test".to_owned());
    Ok(client()?.bucket(name)?)
}

/// Generate a unique object key for a test.
#[must_use]
pub fn test_key(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("oos-it/{prefix}-{id}")
}

/// Write `len` bytes of a repeating pattern to `dir/name`.
pub fn pattern_file(dir: &Path, name: &str, len: usize) -> anyhow::Result<(PathBuf, Vec<u8>)> {
    let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
    let path = dir.join(name);
    std::fs::write(&path, &data)?;
    Ok((path, data))
}

/// Delete objects, ignoring failures.
pub async fn cleanup(bucket: &Bucket, keys: &[&str]) {
    for key in keys {
        if let Err(err) = bucket.delete_object(key).await {
            tracing::warn!(key, error = %err, "cleanup failed");
        }
    }
}

mod test_object;
mod test_transfer;
