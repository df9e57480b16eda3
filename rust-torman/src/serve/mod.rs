//! File resolution for download requests.
//!
//! Path validation comes first: a selector that is absolute or contains a
//! parent-traversal segment is rejected before any disk lookup, whether or
//! not the target exists.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::ArchiveCache;
use crate::engine::EngineGateway;
use crate::error::{Error, Result};
use crate::jobs::model::is_safe_relative;
use crate::jobs::{FileEntry, JobId, JobPhase, JobRegistry};

/// What a download request resolves to.
#[derive(Debug)]
pub enum DownloadContent {
    /// A single file served directly.
    File(FileEntry),
    /// The job's cached archive.
    Archive { path: PathBuf, file_name: String },
}

/// Resolves job files against the registry and archive cache.
pub struct FileServer {
    registry: Arc<JobRegistry>,
    gateway: Arc<EngineGateway>,
    archive: Arc<ArchiveCache>,
}

impl FileServer {
    pub fn new(
        registry: Arc<JobRegistry>,
        gateway: Arc<EngineGateway>,
        archive: Arc<ArchiveCache>,
    ) -> Self {
        Self {
            registry,
            gateway,
            archive,
        }
    }

    /// The job's file list and display name.
    ///
    /// Completed jobs return their frozen snapshot; active jobs get an
    /// on-demand manifest snapshot from the engine.
    pub async fn collect_files(&self, id: &JobId) -> Result<(Vec<FileEntry>, String)> {
        let record = self.registry.get(id)?;
        match &record.phase {
            JobPhase::Completed {
                files, snapshot, ..
            } => Ok((files.clone(), snapshot.name.clone())),
            JobPhase::Active { handle, last } => {
                let manifest = self.gateway.file_manifest(handle).await?;
                let files = manifest
                    .iter()
                    .filter_map(|entry| FileEntry::resolve(&record.save_path, entry))
                    .collect();
                Ok((files, last.name.clone()))
            }
        }
    }

    /// The job's files that currently exist on disk, plus its display name.
    pub async fn files_on_disk(&self, id: &JobId) -> Result<(Vec<FileEntry>, String)> {
        let (files, name) = self.collect_files(id).await?;
        let existing = files
            .into_iter()
            .filter(|entry| entry.absolute_path.exists())
            .collect();
        Ok((existing, name))
    }

    /// Resolve a download request to a single file or the job's archive.
    pub async fn resolve(&self, id: &JobId, selector: Option<&str>) -> Result<DownloadContent> {
        // Traversal rejection precedes existence checks.
        if let Some(selector) = selector
            && !is_safe_relative(Path::new(selector))
        {
            return Err(Error::invalid_path(selector));
        }

        let (mut existing, name) = self.files_on_disk(id).await?;
        if existing.is_empty() {
            return Err(Error::NoFilesOnDisk { id: id.to_string() });
        }

        if let Some(selector) = selector {
            let requested = Path::new(selector);
            return existing
                .into_iter()
                .find(|entry| Path::new(&entry.relative_path) == requested)
                .map(DownloadContent::File)
                .ok_or_else(|| Error::FileNotFound {
                    path: selector.to_string(),
                });
        }

        if existing.len() == 1 {
            return Ok(DownloadContent::File(existing.swap_remove(0)));
        }

        // Multi-file: serve the cached archive, keyed on the completion
        // instant (submission time for jobs not yet marked completed).
        let record = self.registry.get(id)?;
        let freshness = match &record.phase {
            JobPhase::Completed { completed_at, .. } => *completed_at,
            JobPhase::Active { .. } => record.added_at,
        };

        let archive = Arc::clone(&self.archive);
        let job_id = *id;
        let result = tokio::task::spawn_blocking(move || {
            archive.build_if_needed(&job_id, &existing, &name, freshness)
        })
        .await
        .map_err(|e| Error::archive(format!("archive build task failed: {e}")))??;

        let (path, base) = result;
        Ok(DownloadContent::Archive {
            path,
            file_name: format!("{base}.zip"),
        })
    }
}
