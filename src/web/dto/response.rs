//! Response DTOs for the JSON API.

use serde::Serialize;
use utoipa::ToSchema;

use crate::storage::{FileEntry, UploadReport};

/// One entry of `GET /api/files`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileInfoResponse {
    /// Path relative to the upload root.
    #[schema(example = "photos/cat.jpg")]
    pub name: String,
    /// `"1.25 MB"` for files, `"directory"` for directories.
    #[schema(example = "1.25 MB")]
    pub size: String,
    pub is_dir: bool,
}

impl From<&FileEntry> for FileInfoResponse {
    fn from(entry: &FileEntry) -> Self {
        Self {
            name: entry.path.clone(),
            size: entry.size_label(),
            is_dir: entry.is_dir(),
        }
    }
}

/// Plain confirmation message.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    /// Create a new message response.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A file that failed to upload.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadFailureResponse {
    /// Name as sent by the client.
    pub name: String,
    pub error: String,
}

/// Result of `POST /`.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    /// Final relative paths of the saved files.
    pub uploaded: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<UploadFailureResponse>,
    /// Parts skipped for having an empty file name.
    pub skipped: usize,
}

impl From<UploadReport> for UploadResponse {
    fn from(report: UploadReport) -> Self {
        let message = if report.is_complete() {
            "Files uploaded successfully".to_string()
        } else {
            format!(
                "{} of {} files failed to upload",
                report.failed.len(),
                report.failed.len() + report.uploaded.len()
            )
        };

        Self {
            message,
            uploaded: report.uploaded,
            failed: report
                .failed
                .into_iter()
                .map(|f| UploadFailureResponse {
                    name: f.name,
                    error: f.error.to_string(),
                })
                .collect(),
            skipped: report.skipped,
        }
    }
}
