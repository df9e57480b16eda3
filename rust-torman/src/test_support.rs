//! In-memory engine double shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::engine::{
    AddTorrentOptions, EngineState, ManifestEntry, TorrentEngine, TorrentHandle, TorrentSource,
    TransferStats,
};
use crate::error::{Error, Result};

pub fn stats_with_progress(name: &str, progress: f64) -> TransferStats {
    TransferStats {
        name: name.to_string(),
        state: if progress >= 1.0 {
            EngineState::Seeding
        } else {
            EngineState::Downloading
        },
        progress,
        download_rate: 2048,
        upload_rate: 512,
        num_peers: 8,
        num_seeds: 3,
        total_size: 4096,
        downloaded: (4096.0 * progress) as u64,
        uploaded: 1024,
        all_time_download: (4096.0 * progress) as u64,
    }
}

struct StubTorrent {
    stats: TransferStats,
    manifest: Vec<ManifestEntry>,
}

/// Engine double: torrents are plain map entries the test mutates directly.
#[derive(Default)]
pub struct StubEngine {
    torrents: Mutex<HashMap<String, StubTorrent>>,
    removed: Mutex<Vec<(String, bool)>>,
    failing_stats: Mutex<HashSet<String>>,
    wide_distribution: Mutex<HashMap<String, bool>>,
    fail_tracker_adds: AtomicBool,
    next_handle: AtomicU64,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_torrent(&self, handle: &str, stats: TransferStats, manifest: Vec<ManifestEntry>) {
        self.torrents
            .lock()
            .insert(handle.to_string(), StubTorrent { stats, manifest });
    }

    pub fn set_progress(&self, handle: &str, progress: f64) {
        if let Some(torrent) = self.torrents.lock().get_mut(handle) {
            torrent.stats.progress = progress;
        }
    }

    /// Make `stats` fail for this handle, as a dead tracker/engine would.
    pub fn fail_stats_for(&self, handle: &str) {
        self.failing_stats.lock().insert(handle.to_string());
    }

    /// Make every `add_tracker` call fail, as a boost pass against a dead
    /// engine would see.
    pub fn fail_tracker_adds(&self) {
        self.fail_tracker_adds.store(true, Ordering::SeqCst);
    }

    pub fn wide_distribution_enabled(&self, handle: &str) -> bool {
        self.wide_distribution
            .lock()
            .get(handle)
            .copied()
            .unwrap_or(false)
    }

    pub fn removals(&self) -> Vec<(String, bool)> {
        self.removed.lock().clone()
    }

    pub fn was_removed(&self, handle: &str) -> bool {
        self.removed.lock().iter().any(|(h, _)| h == handle)
    }
}

#[async_trait]
impl TorrentEngine for StubEngine {
    async fn add(&self, _source: &TorrentSource, _opts: &AddTorrentOptions) -> Result<TorrentHandle> {
        let handle = format!("stub-{}", self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.insert_torrent(&handle, stats_with_progress("stub", 0.0), Vec::new());
        Ok(TorrentHandle::new(handle))
    }

    async fn stats(&self, handle: &TorrentHandle) -> Result<TransferStats> {
        if self.failing_stats.lock().contains(handle.as_str()) {
            return Err(Error::engine("stats unavailable"));
        }
        self.torrents
            .lock()
            .get(handle.as_str())
            .map(|t| t.stats.clone())
            .ok_or_else(|| Error::engine(format!("unknown handle {handle}")))
    }

    async fn pause(&self, _handle: &TorrentHandle) -> Result<()> {
        Ok(())
    }

    async fn resume(&self, _handle: &TorrentHandle) -> Result<()> {
        Ok(())
    }

    async fn set_auto_managed(&self, _handle: &TorrentHandle, _enabled: bool) -> Result<()> {
        Ok(())
    }

    async fn set_upload_limit(&self, _handle: &TorrentHandle, _limit: Option<u64>) -> Result<()> {
        Ok(())
    }

    async fn set_upload_slots(&self, _handle: &TorrentHandle, _slots: Option<u32>) -> Result<()> {
        Ok(())
    }

    async fn set_connection_limit(&self, _handle: &TorrentHandle, _limit: Option<u32>) -> Result<()> {
        Ok(())
    }

    async fn set_priority(&self, _handle: &TorrentHandle, _priority: u8) -> Result<()> {
        Ok(())
    }

    async fn set_wide_distribution(&self, handle: &TorrentHandle, enabled: bool) -> Result<()> {
        self.wide_distribution
            .lock()
            .insert(handle.as_str().to_string(), enabled);
        Ok(())
    }

    async fn add_tracker(&self, _handle: &TorrentHandle, _url: &str, _tier: u32) -> Result<()> {
        if self.fail_tracker_adds.load(Ordering::SeqCst) {
            return Err(Error::engine("tracker registration rejected"));
        }
        Ok(())
    }

    async fn reannounce(&self, _handle: &TorrentHandle) -> Result<()> {
        Ok(())
    }

    async fn file_manifest(&self, handle: &TorrentHandle) -> Result<Vec<ManifestEntry>> {
        self.torrents
            .lock()
            .get(handle.as_str())
            .map(|t| t.manifest.clone())
            .ok_or_else(|| Error::engine(format!("unknown handle {handle}")))
    }

    async fn remove(&self, handle: &TorrentHandle, delete_files: bool) -> Result<()> {
        self.torrents.lock().remove(handle.as_str());
        self.removed
            .lock()
            .push((handle.as_str().to_string(), delete_files));
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
