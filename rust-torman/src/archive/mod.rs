//! Cached zip archives for completed jobs.
//!
//! A job's archive is a memoized function of (job id, completion instant):
//! the cached zip is reused while its modification time is at or past the
//! freshness marker, and rebuilt otherwise. Builds are synchronous disk-bound
//! work; callers run them on the blocking pool.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::{Error, Result};
use crate::jobs::{FileEntry, JobId};
use crate::utils::filename::sanitize_base_name;

/// Deflate level used for archive builds. Kept fast: archives are built on
/// the completion path and served immediately after.
const COMPRESSION_LEVEL: i64 = 1;

/// Builds and reuses compressed archives of completed jobs.
pub struct ArchiveCache {
    temp_dir: PathBuf,
}

impl ArchiveCache {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }

    /// On-disk location of a job's cached archive.
    pub fn archive_path(&self, id: &JobId) -> PathBuf {
        self.temp_dir.join(format!("{id}.zip"))
    }

    /// Return the job's archive, rebuilding it unless a fresh cached one
    /// exists. Returns the archive path and the sanitized base name for the
    /// attachment filename.
    pub fn build_if_needed(
        &self,
        id: &JobId,
        files: &[FileEntry],
        display_name: &str,
        freshness: DateTime<Utc>,
    ) -> Result<(PathBuf, String)> {
        let zip_path = self.archive_path(id);
        let safe_base = sanitize_base_name(display_name);

        if is_fresh(&zip_path, freshness) {
            debug!(job = %id, path = %zip_path.display(), "reusing cached archive");
            return Ok((zip_path, safe_base));
        }

        if let Some(parent) = zip_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if let Err(e) = write_archive(&zip_path, files) {
            // Never leave a partial archive behind; it would satisfy the
            // freshness check on the next request.
            let _ = std::fs::remove_file(&zip_path);
            return Err(e);
        }

        info!(job = %id, files = files.len(), path = %zip_path.display(), "archive built");
        Ok((zip_path, safe_base))
    }

    /// Drop a job's cached archive, if any.
    pub fn remove_cached(&self, id: &JobId) {
        let _ = std::fs::remove_file(self.archive_path(id));
    }
}

/// A cached archive is valid while it exists, is non-empty, and was written
/// at or after the freshness marker.
fn is_fresh(zip_path: &Path, freshness: DateTime<Utc>) -> bool {
    let Ok(metadata) = std::fs::metadata(zip_path) else {
        return false;
    };
    if metadata.len() == 0 {
        return false;
    }
    match metadata.modified() {
        Ok(mtime) => mtime >= std::time::SystemTime::from(freshness),
        Err(_) => false,
    }
}

fn write_archive(zip_path: &Path, files: &[FileEntry]) -> Result<()> {
    let out = File::create(zip_path)?;
    let mut zip = ZipWriter::new(out);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL));

    for entry in files {
        let mut input = File::open(&entry.absolute_path).map_err(|e| {
            Error::archive(format!(
                "cannot read {}: {e}",
                entry.absolute_path.display()
            ))
        })?;
        zip.start_file(&entry.relative_path, options)
            .map_err(|e| Error::archive(format!("cannot add {}: {e}", entry.relative_path)))?;
        std::io::copy(&mut input, &mut zip)
            .map_err(|e| Error::archive(format!("cannot write {}: {e}", entry.relative_path)))?;
    }

    zip.finish()
        .map_err(|e| Error::archive(format!("cannot finalize archive: {e}")))?;
    Ok(())
}
