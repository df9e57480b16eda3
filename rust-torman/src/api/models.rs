//! API request and response models (DTOs).

use serde::{Deserialize, Serialize};

use crate::jobs::{FileEntry, JobId};

/// Body of `POST /api/torrents`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddJobRequest {
    /// Magnet link, torrent URL, or info hash.
    #[serde(default)]
    pub url: Option<String>,
    /// Custom save path.
    #[serde(default)]
    pub save_path: Option<String>,
    /// Download pieces in order.
    #[serde(default)]
    pub sequential: bool,
    /// Deprecated alias for `url`, kept for old clients.
    #[serde(default)]
    pub magnet: Option<String>,
}

impl AddJobRequest {
    /// The locator, honoring the deprecated `magnet` field.
    pub fn locator(&self) -> Option<&str> {
        self.url
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.magnet.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// Response of the submission endpoints.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub torrent_id: JobId,
    pub message: String,
}

/// Response of pause/resume/delete.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Query parameters of the raw upload endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub save_path: Option<String>,
    #[serde(default)]
    pub sequential: bool,
}

/// Query parameters of `DELETE /api/torrents/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub delete_files: bool,
}

/// Query parameters of the download endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct DownloadParams {
    /// Specific file to download, relative to the job's save root.
    #[serde(default)]
    pub file: Option<String>,
}

/// One downloadable file, as listed by `GET /api/torrents/{id}/files`.
#[derive(Debug, Serialize)]
pub struct FileInfo {
    pub relative_path: String,
    pub size: u64,
}

impl From<&FileEntry> for FileInfo {
    fn from(entry: &FileEntry) -> Self {
        Self {
            relative_path: entry.relative_path.clone(),
            size: entry.size,
        }
    }
}

/// Storage capacity summary reported by the health endpoint.
#[derive(Debug, Default, Serialize)]
pub struct StorageSummary {
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub used_percent: f64,
}

/// Response of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_torrents: usize,
    pub storage: StorageSummary,
}
