//! Health check route.

use std::path::Path;

use axum::{Json, Router, extract::State, routing::get};
use sysinfo::Disks;
use tracing::warn;

use crate::api::models::{HealthResponse, StorageSummary};
use crate::api::server::AppState;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

/// Health check endpoint: active job count plus a storage capacity summary
/// for the download directory.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.context.started_at.elapsed().as_secs(),
        active_torrents: state.context.registry.active_count(),
        storage: storage_summary(&state.context.config.download_dir),
    })
}

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Capacity of the disk holding `path`: the disk whose mount point is the
/// longest prefix of the path.
fn storage_summary(path: &Path) -> StorageSummary {
    let disks = Disks::new_with_refreshed_list();

    let disk = disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len());

    let Some(disk) = disk else {
        warn!(path = %path.display(), "no disk found for download directory");
        return StorageSummary::default();
    };

    let total = disk.total_space();
    let free = disk.available_space();
    let used = total.saturating_sub(free);
    let used_percent = if total > 0 {
        (used as f64 / total as f64 * 1000.0).round() / 10.0
    } else {
        0.0
    };

    StorageSummary {
        total_gb: round2(total as f64 / GIB),
        used_gb: round2(used as f64 / GIB),
        free_gb: round2(free as f64 / GIB),
        used_percent,
    }
}
