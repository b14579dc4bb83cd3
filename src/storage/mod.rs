//! Upload Gateway
//!
//! Moves a CSV file into blob storage and returns the storage key that
//! later analysis calls refer to. Progress is reported through a plain
//! callback; only the latest tick matters to consumers (see
//! [`ProgressTracker`]).

pub mod progress;
pub mod s3_client;

pub use progress::ProgressTracker;
pub use s3_client::S3UploadGateway;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::path::Path;

const DEFAULT_CONTENT_TYPE: &str = "text/csv";

/// Upload failures. `Unexpected` hides its detail from users.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UploadError {
    #[error("{0}")]
    Transfer(String),

    #[error("{0}")]
    InvalidFile(String),

    #[error("The chat was reset before the upload finished")]
    SessionChanged,

    #[error("An unexpected error occurred")]
    Unexpected(String),
}

impl UploadError {
    /// Classified errors carry a message meant for the user.
    pub fn is_classified(&self) -> bool {
        !matches!(self, UploadError::Unexpected(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    pub loaded: u64,
    pub total: u64,
    pub percentage: u8,
}

impl UploadProgress {
    /// `None` when `total` is zero; there is nothing meaningful to show.
    pub fn new(loaded: u64, total: u64) -> Option<Self> {
        if total == 0 {
            return None;
        }
        let loaded = loaded.min(total);
        let percentage = ((loaded as f64 * 100.0) / total as f64).round() as u8;
        Some(Self {
            loaded,
            total,
            percentage,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(
        name: impl Into<String>,
        content_type: Option<String>,
        bytes: Bytes,
    ) -> Result<Self, UploadError> {
        let name = name.into();
        let is_csv = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            return Err(UploadError::InvalidFile(format!(
                "Only .csv files can be uploaded (got {})",
                name
            )));
        }

        let content_type = content_type
            .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
            .or_else(|| mime_guess::from_path(&name).first_raw().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        Ok(Self {
            name,
            content_type,
            bytes,
        })
    }

    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploadError::InvalidFile(format!("{} is not a file", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| UploadError::InvalidFile(format!("Could not read {}: {}", path.display(), e)))?;
        Self::new(name, None, Bytes::from(bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Blob storage for uploaded datasets.
///
/// `on_progress` may be called zero or more times before the upload settles.
#[async_trait]
pub trait UploadGateway: Send + Sync {
    async fn upload(
        &self,
        file: UploadFile,
        on_progress: &(dyn Fn(UploadProgress) + Send + Sync),
    ) -> Result<String, UploadError>;
}
