use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Lifecycle of one upload
///
/// `Pending → Uploading → {Success, Error}`. `Processing` is the display
/// state of a successful upload whose document is being analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Processing,
    Success,
    Error,
}

impl UploadStatus {
    /// Only tasks with nothing in flight may leave the queue
    pub fn is_removable(&self) -> bool {
        matches!(self, UploadStatus::Pending | UploadStatus::Error)
    }

    /// Progress is only meaningful while work is in flight
    pub fn is_active(&self) -> bool {
        matches!(self, UploadStatus::Uploading | UploadStatus::Processing)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Processing => "processing",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// A local file selected for upload
#[derive(Clone)]
pub struct UploadFile {
    pub name: String,
    /// File contents; clones share the buffer
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("size", &self.size())
            .finish()
    }
}

/// One file's journey through upload
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub id: String,
    pub file: UploadFile,
    pub status: UploadStatus,
    /// Percentage in `[0, 100]`
    pub progress: f64,
    /// Assigned by the backend once the upload succeeded
    pub doc_id: Option<i64>,
    pub error: Option<String>,
}

impl UploadTask {
    pub fn new(id: String, file: UploadFile) -> Self {
        Self {
            id,
            file,
            status: UploadStatus::Pending,
            progress: 0.0,
            doc_id: None,
            error: None,
        }
    }

    /// Uploaded and ready to be analyzed
    pub fn is_analyzable(&self) -> bool {
        self.status == UploadStatus::Success && self.doc_id.is_some()
    }
}
