use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use std::fs;
use std::path::Path;
use tracing::{debug, error};

/// Durable object storage keyed by path-like keys.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the file at `path` under `key`, replacing any existing object.
    async fn put_file(&self, key: &str, path: &Path) -> Result<()>;
}

/// An S3 bucket holding CSV reports.
pub struct S3Bucket {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Bucket {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Bucket {
    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("text/csv")
            .body(body)
            .send()
            .await
            .map_err(|err| {
                error!("PutObject {}/{} failed: {}", self.bucket, key, DisplayErrorContext(&err));
                err
            })?;

        Ok(())
    }
}

/// Write `content` to `file_name` in a fresh temporary directory and upload it as `key`.
///
/// The file and its directory are removed when this returns, whether or not
/// the upload succeeded.
pub async fn upload_text(
    store: &dyn ObjectStore,
    key: &str,
    file_name: &str,
    content: &str,
) -> Result<()> {
    let dir = tempfile::tempdir().context("creating temporary directory")?;
    let path = dir.path().join(file_name);

    fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
    debug!("Wrote {} bytes to {}", content.len(), path.display());

    let uploaded = store.put_file(key, &path).await;
    let closed = dir.close();

    uploaded?;
    closed.context("removing temporary report directory")?;

    Ok(())
}
