use std::path::PathBuf;

use crate::api::error;

/// Object storage for chat media; returns the public URL of the stored object.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, error::SystemError>;
}

/// Writes objects under `upload_dir`; they are served from `base_url`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    upload_dir: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(upload_dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self { upload_dir: upload_dir.into(), base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, error::SystemError> {
        if key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(error::SystemError::bad_request("Invalid object key"));
        }

        let path = self.upload_dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;

        tracing::debug!("Stored {} bytes ({content_type}) at {}", bytes.len(), path.display());
        Ok(format!("{}/{key}", self.base_url))
    }
}
