//! Job data model.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{EngineState, ManifestEntry, TorrentHandle, TransferStats};

/// Unique job identifier, generated at submission and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a job was submitted.
#[derive(Debug, Clone)]
pub enum JobSource {
    Magnet { uri: String },
    DescriptorUrl { url: String },
    InfoHash { hash: String },
    UploadedFile,
}

impl JobSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Magnet { .. } => "magnet",
            Self::DescriptorUrl { .. } => "url",
            Self::InfoHash { .. } => "hash",
            Self::UploadedFile => "file",
        }
    }
}

/// Lifecycle state exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Checking,
    FetchingMetadata,
    Downloading,
    Seeding,
    Paused,
    Completed,
}

impl From<EngineState> for JobState {
    fn from(state: EngineState) -> Self {
        match state {
            EngineState::Checking => Self::Checking,
            EngineState::FetchingMetadata => Self::FetchingMetadata,
            EngineState::Downloading => Self::Downloading,
            EngineState::Seeding => Self::Seeding,
            EngineState::Paused => Self::Paused,
        }
    }
}

/// `uploaded / max(downloaded, 1)`; never divides by zero.
pub fn transfer_ratio(uploaded: u64, downloaded: u64) -> f64 {
    uploaded as f64 / downloaded.max(1) as f64
}

/// Serializable stats view of a job, pushed to clients and returned by the
/// API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub name: String,
    pub state: JobState,
    /// Completion percentage in `0.0..=100.0`.
    pub progress: f64,
    pub download_rate: u64,
    pub upload_rate: u64,
    pub num_peers: u32,
    pub num_seeds: u32,
    pub total_size: u64,
    pub downloaded: u64,
    pub uploaded: u64,
    pub ratio: f64,
    /// Estimated seconds remaining; `-1` when unknown, `0` once completed.
    pub eta_secs: i64,
    pub save_path: String,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    /// Snapshot of an active job from engine stats.
    pub fn from_stats(
        id: JobId,
        stats: &TransferStats,
        save_path: &Path,
        added_at: DateTime<Utc>,
    ) -> Self {
        let eta_secs = if stats.download_rate > 0 {
            (stats.total_size.saturating_sub(stats.downloaded) / stats.download_rate) as i64
        } else {
            -1
        };

        Self {
            id,
            name: stats.name.clone(),
            state: stats.state.into(),
            progress: stats.progress * 100.0,
            download_rate: stats.download_rate,
            upload_rate: stats.upload_rate,
            num_peers: stats.num_peers,
            num_seeds: stats.num_seeds,
            total_size: stats.total_size,
            downloaded: stats.downloaded,
            uploaded: stats.uploaded,
            ratio: transfer_ratio(stats.uploaded, stats.all_time_download),
            eta_secs,
            save_path: save_path.to_string_lossy().into_owned(),
            added_at,
            completed_at: None,
        }
    }

    /// Final snapshot of a completed job: progress pinned at 100, rates and
    /// peer counts zeroed.
    pub fn completed(
        id: JobId,
        stats: &TransferStats,
        save_path: &Path,
        added_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: stats.name.clone(),
            state: JobState::Completed,
            progress: 100.0,
            download_rate: 0,
            upload_rate: 0,
            num_peers: 0,
            num_seeds: 0,
            total_size: stats.total_size,
            downloaded: stats.total_size,
            uploaded: stats.uploaded,
            ratio: transfer_ratio(stats.uploaded, stats.all_time_download),
            eta_secs: 0,
            save_path: save_path.to_string_lossy().into_owned(),
            added_at,
            completed_at: Some(completed_at),
        }
    }
}

/// One file of a job, with its path resolved against the save root.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path relative to the save root.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub size: u64,
}

impl FileEntry {
    /// Resolve a manifest entry against the save root.
    ///
    /// Returns `None` for unsafe relative paths (absolute, or containing a
    /// parent-traversal segment) so an absolute path is only ever derived by
    /// joining the save root with a safe relative path.
    pub fn resolve(save_root: &Path, entry: &ManifestEntry) -> Option<Self> {
        let relative = Path::new(&entry.relative_path);
        if !is_safe_relative(relative) {
            return None;
        }
        Some(Self {
            relative_path: entry.relative_path.clone(),
            absolute_path: save_root.join(relative),
            size: entry.size,
        })
    }
}

/// True when a path is relative and free of parent-traversal segments.
pub fn is_safe_relative(path: &Path) -> bool {
    if path.as_os_str().is_empty() {
        return false;
    }
    path.components().all(|component| {
        matches!(component, Component::Normal(_) | Component::CurDir)
    })
}

/// Exactly one of the two phases holds at any instant; the transition is
/// one-way.
#[derive(Debug, Clone)]
pub enum JobPhase {
    /// Engine-attached, polled by the monitor.
    Active {
        handle: TorrentHandle,
        last: JobSnapshot,
    },
    /// Detached from the engine; stats and files are frozen snapshots.
    Completed {
        snapshot: JobSnapshot,
        files: Vec<FileEntry>,
        completed_at: DateTime<Utc>,
    },
}

/// One managed bulk-transfer job.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub added_at: DateTime<Utc>,
    pub save_path: PathBuf,
    /// Retained `.torrent` artifact for url/upload submissions.
    pub descriptor_path: Option<PathBuf>,
    pub source: JobSource,
    pub phase: JobPhase,
}

impl JobRecord {
    pub fn snapshot(&self) -> &JobSnapshot {
        match &self.phase {
            JobPhase::Active { last, .. } => last,
            JobPhase::Completed { snapshot, .. } => snapshot,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.phase, JobPhase::Completed { .. })
    }

    pub fn handle(&self) -> Option<&TorrentHandle> {
        match &self.phase {
            JobPhase::Active { handle, .. } => Some(handle),
            JobPhase::Completed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineState;

    fn stats(progress: f64) -> TransferStats {
        TransferStats {
            name: "job".to_string(),
            state: EngineState::Downloading,
            progress,
            download_rate: 1000,
            upload_rate: 50,
            num_peers: 4,
            num_seeds: 2,
            total_size: 10_000,
            downloaded: 5_000,
            uploaded: 2_500,
            all_time_download: 5_000,
        }
    }

    #[test]
    fn test_ratio_never_divides_by_zero() {
        assert_eq!(transfer_ratio(300, 0), 300.0);
        assert_eq!(transfer_ratio(0, 0), 0.0);
        assert_eq!(transfer_ratio(500, 1000), 0.5);
        assert!(transfer_ratio(u64::MAX, 0).is_finite());
    }

    #[test]
    fn test_snapshot_from_stats() {
        let snapshot = JobSnapshot::from_stats(
            JobId::generate(),
            &stats(0.5),
            Path::new("/downloads"),
            Utc::now(),
        );
        assert_eq!(snapshot.progress, 50.0);
        assert_eq!(snapshot.state, JobState::Downloading);
        assert_eq!(snapshot.eta_secs, 5);
        assert_eq!(snapshot.ratio, 0.5);
        assert!(snapshot.completed_at.is_none());
    }

    #[test]
    fn test_snapshot_eta_unknown_without_rate() {
        let mut s = stats(0.5);
        s.download_rate = 0;
        let snapshot =
            JobSnapshot::from_stats(JobId::generate(), &s, Path::new("/downloads"), Utc::now());
        assert_eq!(snapshot.eta_secs, -1);
    }

    #[test]
    fn test_completed_snapshot_pins_final_values() {
        let completed_at = Utc::now();
        let snapshot = JobSnapshot::completed(
            JobId::generate(),
            &stats(1.0),
            Path::new("/downloads"),
            Utc::now(),
            completed_at,
        );
        assert_eq!(snapshot.progress, 100.0);
        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(snapshot.download_rate, 0);
        assert_eq!(snapshot.upload_rate, 0);
        assert_eq!(snapshot.num_peers, 0);
        assert_eq!(snapshot.num_seeds, 0);
        assert_eq!(snapshot.downloaded, snapshot.total_size);
        assert_eq!(snapshot.eta_secs, 0);
        assert_eq!(snapshot.completed_at, Some(completed_at));
    }

    #[test]
    fn test_file_entry_rejects_unsafe_paths() {
        let root = Path::new("/downloads");
        let entry = |p: &str| ManifestEntry {
            relative_path: p.to_string(),
            size: 1,
        };

        assert!(FileEntry::resolve(root, &entry("dir/file.bin")).is_some());
        assert!(FileEntry::resolve(root, &entry("../escape")).is_none());
        assert!(FileEntry::resolve(root, &entry("dir/../../escape")).is_none());
        assert!(FileEntry::resolve(root, &entry("/etc/passwd")).is_none());
        assert!(FileEntry::resolve(root, &entry("")).is_none());
    }

    #[test]
    fn test_file_entry_resolves_against_root() {
        let entry = ManifestEntry {
            relative_path: "show/episode.mkv".to_string(),
            size: 42,
        };
        let resolved = FileEntry::resolve(Path::new("/downloads"), &entry).unwrap();
        assert_eq!(resolved.absolute_path, Path::new("/downloads/show/episode.mkv"));
        assert_eq!(resolved.size, 42);
    }

    #[test]
    fn test_job_id_uniqueness() {
        let ids: std::collections::HashSet<_> =
            (0..1000).map(|_| JobId::generate().to_string()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
