//! Blob Store
//!
//! Byte storage for chat attachments. A stored blob gets a stable public URL
//! and a deletion handle; messages only ever keep the URL.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::config::UploadSettings;
use crate::shared::error::AppError;

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredBlob {
    /// Public URL (`data` of an attachment)
    #[serde(rename = "data")]
    pub url: String,
    /// MIME type as given by the uploader
    #[serde(rename = "type")]
    pub mime_type: String,
    pub name: String,
    pub size: u64,
    /// Opaque token for [`BlobStore::delete`]
    pub handle: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bytes: &[u8], name: &str, mime_type: &str) -> Result<StoredBlob, AppError>;

    /// Remove a blob. Returns false if the handle was unknown.
    async fn delete(&self, handle: &str) -> Result<bool, AppError>;
}

/// Writes blobs into a local directory served under a public path.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    dir: PathBuf,
    public_path: String,
}

impl LocalBlobStore {
    pub fn new(dir: impl Into<PathBuf>, public_path: &str) -> Self {
        Self {
            dir: dir.into(),
            public_path: public_path.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &UploadSettings) -> Self {
        Self::new(&settings.dir, &settings.public_path)
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn is_valid_handle(handle: &str) -> bool {
        !handle.is_empty()
            && !handle.starts_with('.')
            && handle
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    }
}

/// Keep ascii letters, digits, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.chars().take(120).collect()
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, bytes: &[u8], name: &str, mime_type: &str) -> Result<StoredBlob, AppError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Persistence(format!("create upload dir: {}", e)))?;

        let handle = format!(
            "{}-{}-{}",
            Utc::now().timestamp_millis(),
            &Uuid::new_v4().simple().to_string()[..8],
            sanitize_filename(name)
        );
        tokio::fs::write(self.dir.join(&handle), bytes)
            .await
            .map_err(|e| AppError::Persistence(format!("write upload {}: {}", handle, e)))?;

        tracing::debug!(handle = %handle, size = bytes.len(), "Blob stored");

        Ok(StoredBlob {
            url: format!("{}/{}", self.public_path, handle),
            mime_type: mime_type.to_string(),
            name: name.to_string(),
            size: bytes.len() as u64,
            handle,
        })
    }

    async fn delete(&self, handle: &str) -> Result<bool, AppError> {
        if !Self::is_valid_handle(handle) {
            return Err(AppError::Validation("handle: invalid blob handle".into()));
        }
        match tokio::fs::remove_file(self.dir.join(handle)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Persistence(format!("delete upload {}: {}", handle, e))),
        }
    }
}
