//! Authoritative in-memory store of active and completed jobs.
//!
//! Both maps live behind one `RwLock`; every mutation completes under a
//! single lock acquisition with no await points, so the active → completed
//! transition is atomic. Engine calls and disk cleanup happen outside the
//! lock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::archive::ArchiveCache;
use crate::engine::{EngineGateway, TorrentHandle};
use crate::error::{Error, Result};
use crate::utils::fs::prune_empty_ancestors;

use super::model::{FileEntry, JobId, JobPhase, JobRecord, JobSnapshot};

#[derive(Default)]
struct RegistryInner {
    active: HashMap<JobId, JobRecord>,
    completed: HashMap<JobId, JobRecord>,
}

/// In-memory job store with removal side effects.
pub struct JobRegistry {
    gateway: Arc<EngineGateway>,
    archive: Arc<ArchiveCache>,
    inner: RwLock<RegistryInner>,
}

impl JobRegistry {
    pub fn new(gateway: Arc<EngineGateway>, archive: Arc<ArchiveCache>) -> Self {
        Self {
            gateway,
            archive,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Register a freshly submitted job.
    pub fn insert(&self, record: JobRecord) {
        let mut inner = self.inner.write();
        inner.active.insert(record.id, record);
    }

    /// Clone the full record for a job, active or completed.
    pub fn get(&self, id: &JobId) -> Result<JobRecord> {
        let inner = self.inner.read();
        inner
            .active
            .get(id)
            .or_else(|| inner.completed.get(id))
            .cloned()
            .ok_or_else(|| Error::not_found(id.to_string()))
    }

    /// Current stats snapshot for a job, active or completed.
    pub fn snapshot_of(&self, id: &JobId) -> Result<JobSnapshot> {
        Ok(self.get(id)?.snapshot().clone())
    }

    /// Engine handle of an active job. Completed and unknown ids both miss.
    pub fn active_handle(&self, id: &JobId) -> Result<TorrentHandle> {
        let inner = self.inner.read();
        inner
            .active
            .get(id)
            .and_then(|record| record.handle().cloned())
            .ok_or_else(|| Error::not_found(id.to_string()))
    }

    /// Ids and handles of every active job, for the monitor's poll pass.
    pub fn active_jobs(&self) -> Vec<(JobId, TorrentHandle)> {
        let inner = self.inner.read();
        inner
            .active
            .values()
            .filter_map(|record| record.handle().map(|h| (record.id, h.clone())))
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.inner.read().active.len()
    }

    /// Store a refreshed stats snapshot for a still-active job.
    pub fn refresh_from_stats(&self, id: &JobId, stats: &crate::engine::TransferStats) {
        let mut inner = self.inner.write();
        if let Some(record) = inner.active.get_mut(id) {
            let snapshot = JobSnapshot::from_stats(*id, stats, &record.save_path, record.added_at);
            if let JobPhase::Active { last, .. } = &mut record.phase {
                *last = snapshot;
            }
        }
    }

    /// One-way transition of a job from active to completed.
    ///
    /// Returns `false` when the job is no longer in the active map (already
    /// completed or removed), which makes re-detection a no-op.
    pub fn complete(
        &self,
        id: &JobId,
        snapshot: JobSnapshot,
        files: Vec<FileEntry>,
        completed_at: DateTime<Utc>,
    ) -> bool {
        let mut inner = self.inner.write();
        let Some(mut record) = inner.active.remove(id) else {
            return false;
        };
        record.phase = JobPhase::Completed {
            snapshot,
            files,
            completed_at,
        };
        inner.completed.insert(*id, record);
        true
    }

    /// All jobs, newest submission first.
    pub fn merged_view(&self) -> Vec<JobSnapshot> {
        let inner = self.inner.read();
        let mut jobs: Vec<JobSnapshot> = inner
            .active
            .values()
            .chain(inner.completed.values())
            .map(|record| record.snapshot().clone())
            .collect();
        jobs.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        jobs
    }

    /// Remove a job wherever it lives. `NotFound` for unknown ids.
    pub async fn remove(&self, id: &JobId, delete_files: bool) -> Result<()> {
        match self.remove_active(id, delete_files).await {
            Err(Error::NotFound { .. }) => self.remove_completed(id, delete_files).await,
            result => result,
        }
    }

    /// Remove an active job: detach it from the engine (optionally deleting
    /// its files), then drop it from the registry and clean up artifacts.
    pub async fn remove_active(&self, id: &JobId, delete_files: bool) -> Result<()> {
        let handle = self.active_handle(id)?;

        self.gateway.remove(&handle, delete_files).await?;

        let record = self.inner.write().active.remove(id);
        if let Some(record) = record {
            self.cleanup_artifacts(&record);
            info!(job = %id, delete_files, "removed active job");
        }
        Ok(())
    }

    /// Remove a completed job: optionally delete its snapshotted files from
    /// disk and prune now-empty ancestor directories, then clean up
    /// artifacts.
    pub async fn remove_completed(&self, id: &JobId, delete_files: bool) -> Result<()> {
        let record = self
            .inner
            .write()
            .completed
            .remove(id)
            .ok_or_else(|| Error::not_found(id.to_string()))?;

        if delete_files
            && let JobPhase::Completed { files, .. } = &record.phase
        {
            delete_snapshotted_files(files, &record.save_path);
        }

        self.cleanup_artifacts(&record);
        info!(job = %id, delete_files, "removed completed job");
        Ok(())
    }

    /// Delete the cached archive and retained torrent file for a job.
    fn cleanup_artifacts(&self, record: &JobRecord) {
        self.archive.remove_cached(&record.id);
        if let Some(descriptor) = &record.descriptor_path
            && let Err(e) = std::fs::remove_file(descriptor)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(job = %record.id, error = %e, "could not delete torrent file artifact");
        }
    }
}

/// Unlink every snapshotted file, then prune empty directories upward from
/// each file's parent and from the save root, stopping before the
/// filesystem root.
fn delete_snapshotted_files(files: &[FileEntry], save_path: &PathBuf) {
    for entry in files {
        if let Err(e) = std::fs::remove_file(&entry.absolute_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %entry.absolute_path.display(), error = %e, "could not delete file");
        }
    }
    for entry in files {
        if let Some(parent) = entry.absolute_path.parent() {
            prune_empty_ancestors(parent);
        }
    }
    prune_empty_ancestors(save_path);
}
