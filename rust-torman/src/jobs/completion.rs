//! Completion detection: the one-way Active → Completed transition.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::archive::ArchiveCache;
use crate::engine::{EngineGateway, TorrentHandle, TransferStats};

use super::model::{FileEntry, JobId, JobSnapshot};
use super::registry::JobRegistry;

/// Turns a fully downloaded job into a completed record.
///
/// The sequence is best-effort: later steps proceed even when an earlier
/// non-critical step fails, and the registry transition at the end is the
/// idempotency guard. Until it lands, the next tick simply retries.
pub struct CompletionDetector {
    gateway: Arc<EngineGateway>,
    registry: Arc<JobRegistry>,
    archive: Arc<ArchiveCache>,
}

impl CompletionDetector {
    pub fn new(
        gateway: Arc<EngineGateway>,
        registry: Arc<JobRegistry>,
        archive: Arc<ArchiveCache>,
    ) -> Self {
        Self {
            gateway,
            registry,
            archive,
        }
    }

    /// Finalize a job whose transfer reached full progress.
    ///
    /// Snapshots the file manifest, quiesces and detaches the transfer,
    /// pre-builds the archive for multi-file jobs, and records the completed
    /// snapshot in the registry. A job already completed (or removed) is
    /// skipped.
    pub async fn finalize(&self, id: &JobId, handle: &TorrentHandle, stats: &TransferStats) {
        let record = match self.registry.get(id) {
            Ok(record) if !record.is_completed() => record,
            _ => return,
        };
        let completed_at = Utc::now();

        // Manifest snapshot; an unreadable manifest yields an empty file
        // list rather than aborting the transition.
        let files: Vec<FileEntry> = match self.gateway.file_manifest(handle).await {
            Ok(manifest) => manifest
                .iter()
                .filter_map(|entry| {
                    let resolved = FileEntry::resolve(&record.save_path, entry);
                    if resolved.is_none() {
                        warn!(job = %id, path = %entry.relative_path, "dropping unsafe manifest path");
                    }
                    resolved
                })
                .collect(),
            Err(e) => {
                warn!(job = %id, error = %e, "could not snapshot file manifest");
                Vec::new()
            }
        };

        // Stop the transfer and cut its upload allowance before detaching.
        self.gateway.quiesce(handle).await;

        let snapshot =
            JobSnapshot::completed(*id, stats, &record.save_path, record.added_at, completed_at);
        let display_name = snapshot.name.clone();

        // Pre-build the archive so the first download request is instant.
        if files.len() > 1 {
            let archive = Arc::clone(&self.archive);
            let job_id = *id;
            let build_files = files.clone();
            let result = tokio::task::spawn_blocking(move || {
                archive.build_if_needed(&job_id, &build_files, &display_name, completed_at)
            })
            .await;
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(job = %id, error = %e, "could not pre-build archive"),
                Err(e) => warn!(job = %id, error = %e, "archive pre-build task failed"),
            }
        }

        // Detach from the engine: frees its connections and resources.
        // Irreversible; the files stay on disk.
        if let Err(e) = self.gateway.detach(handle).await {
            warn!(job = %id, error = %e, "could not detach completed transfer from engine");
        }

        if self
            .registry
            .complete(id, snapshot, files, completed_at)
        {
            info!(job = %id, name = %stats.name, "transfer completed, seeding stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ManifestEntry, TorrentHandle};
    use crate::jobs::model::{JobPhase, JobRecord, JobSource, JobState};
    use crate::test_support::{StubEngine, stats_with_progress};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        engine: Arc<StubEngine>,
        registry: Arc<JobRegistry>,
        detector: CompletionDetector,
        save_path: std::path::PathBuf,
        archive: Arc<ArchiveCache>,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let engine = Arc::new(StubEngine::new());
        let gateway = Arc::new(EngineGateway::new(engine.clone(), 300));
        let archive = Arc::new(ArchiveCache::new(temp.path().join("temp")));
        let registry = Arc::new(JobRegistry::new(gateway.clone(), archive.clone()));
        let detector = CompletionDetector::new(gateway, registry.clone(), archive.clone());
        let save_path = temp.path().join("downloads");
        std::fs::create_dir_all(&save_path).unwrap();
        Fixture {
            _temp: temp,
            engine,
            registry,
            detector,
            save_path,
            archive,
        }
    }

    fn insert_active(fixture: &Fixture, handle: &str, manifest: Vec<ManifestEntry>) -> JobId {
        let id = JobId::generate();
        let added_at = chrono::Utc::now();
        let stats = stats_with_progress("done job", 1.0);
        fixture
            .engine
            .insert_torrent(handle, stats.clone(), manifest);
        fixture.registry.insert(JobRecord {
            id,
            added_at,
            save_path: fixture.save_path.clone(),
            descriptor_path: None,
            source: JobSource::Magnet {
                uri: "magnet:?xt=urn:btih:abc".to_string(),
            },
            phase: JobPhase::Active {
                handle: TorrentHandle::new(handle),
                last: JobSnapshot::from_stats(id, &stats, &fixture.save_path, added_at),
            },
        });
        id
    }

    fn write_content(fixture: &Fixture, relative: &str) -> ManifestEntry {
        let absolute = fixture.save_path.join(relative);
        std::fs::create_dir_all(absolute.parent().unwrap()).unwrap();
        std::fs::write(&absolute, relative.as_bytes()).unwrap();
        ManifestEntry {
            relative_path: relative.to_string(),
            size: relative.len() as u64,
        }
    }

    #[tokio::test]
    async fn test_finalize_moves_job_to_completed() {
        let fixture = fixture();
        let manifest = vec![write_content(&fixture, "pack/a.txt")];
        let id = insert_active(&fixture, "h1", manifest);
        let handle = TorrentHandle::new("h1");
        let stats = stats_with_progress("done job", 1.0);

        fixture.detector.finalize(&id, &handle, &stats).await;

        assert_eq!(fixture.registry.active_count(), 0);
        let record = fixture.registry.get(&id).unwrap();
        assert!(record.is_completed());

        let snapshot = record.snapshot();
        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(snapshot.progress, 100.0);
        assert_eq!(snapshot.download_rate, 0);
        assert_eq!(snapshot.num_peers, 0);
        assert!(snapshot.completed_at.is_some());

        // Detached from the engine, files kept.
        assert!(fixture.engine.was_removed("h1"));
        assert_eq!(fixture.engine.removals(), vec![("h1".to_string(), false)]);
        assert!(fixture.save_path.join("pack/a.txt").exists());
    }

    #[tokio::test]
    async fn test_finalize_prebuilds_archive_for_multi_file_jobs() {
        let fixture = fixture();
        let manifest = vec![
            write_content(&fixture, "pack/a.txt"),
            write_content(&fixture, "pack/b.txt"),
        ];
        let id = insert_active(&fixture, "h1", manifest);

        fixture
            .detector
            .finalize(&id, &TorrentHandle::new("h1"), &stats_with_progress("done job", 1.0))
            .await;

        assert!(fixture.archive.archive_path(&id).exists());
    }

    #[tokio::test]
    async fn test_finalize_skips_archive_for_single_file_jobs() {
        let fixture = fixture();
        let manifest = vec![write_content(&fixture, "single.txt")];
        let id = insert_active(&fixture, "h1", manifest);

        fixture
            .detector
            .finalize(&id, &TorrentHandle::new("h1"), &stats_with_progress("done job", 1.0))
            .await;

        assert!(!fixture.archive.archive_path(&id).exists());
    }

    #[tokio::test]
    async fn test_finalize_is_idempotent() {
        let fixture = fixture();
        let manifest = vec![
            write_content(&fixture, "pack/a.txt"),
            write_content(&fixture, "pack/b.txt"),
        ];
        let id = insert_active(&fixture, "h1", manifest);
        let handle = TorrentHandle::new("h1");
        let stats = stats_with_progress("done job", 1.0);

        fixture.detector.finalize(&id, &handle, &stats).await;
        let first = fixture.registry.get(&id).unwrap().snapshot().clone();
        let archive_mtime = std::fs::metadata(fixture.archive.archive_path(&id))
            .unwrap()
            .modified()
            .unwrap();

        fixture.detector.finalize(&id, &handle, &stats).await;

        let second = fixture.registry.get(&id).unwrap().snapshot().clone();
        assert_eq!(first.completed_at, second.completed_at);
        // Only one engine detach happened.
        assert_eq!(fixture.engine.removals().len(), 1);
        // The fresh archive was not rebuilt.
        let mtime_after = std::fs::metadata(fixture.archive.archive_path(&id))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(archive_mtime, mtime_after);
    }

    #[tokio::test]
    async fn test_unreadable_manifest_yields_empty_snapshot() {
        let fixture = fixture();
        let id = insert_active(&fixture, "h1", Vec::new());
        // Engine loses the handle before finalization.
        let handle = TorrentHandle::new("gone");

        fixture
            .detector
            .finalize(&id, &handle, &stats_with_progress("done job", 1.0))
            .await;

        let record = fixture.registry.get(&id).unwrap();
        assert!(record.is_completed());
        if let JobPhase::Completed { files, .. } = &record.phase {
            assert!(files.is_empty());
        }
    }
}
