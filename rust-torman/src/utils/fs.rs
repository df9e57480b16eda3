//! Filesystem helpers shared across modules.

use std::path::Path;

use crate::Result;

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

/// Remove `start` and its ancestors as long as they are empty directories.
///
/// Stops at the first non-empty directory, at the first removal failure, and
/// always before the filesystem root.
pub fn prune_empty_ancestors(start: &Path) {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.parent().is_none() {
            break;
        }
        if std::fs::remove_dir(dir).is_err() {
            break;
        }
        current = dir.parent();
    }
}
