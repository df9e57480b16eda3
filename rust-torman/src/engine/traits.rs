//! Transfer engine trait and related types.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Opaque reference to a transfer the engine is driving.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TorrentHandle(String);

impl TorrentHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TorrentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the engine is submitted to transfer.
#[derive(Debug, Clone)]
pub enum TorrentSource {
    /// A magnet URI (covers plain info hashes, which are wrapped into a
    /// magnet before submission).
    MagnetUri(String),
    /// Raw torrent file bytes.
    Metainfo(Vec<u8>),
}

/// Options recognized when submitting a transfer.
#[derive(Debug, Clone)]
pub struct AddTorrentOptions {
    /// Directory the engine writes content into.
    pub save_path: PathBuf,
    /// Allocate files sparsely rather than pre-allocating.
    pub sparse_storage: bool,
    /// Let the engine's queue manager start/stop the transfer.
    pub auto_managed: bool,
    /// Download pieces in order.
    pub sequential: bool,
    /// Opaque engine tuning value, passed through unchanged. The source of
    /// this setting does not say whether it is a percentage or a raw count,
    /// so it is never interpreted here.
    pub peer_turnover_cutoff: Option<i64>,
}

impl AddTorrentOptions {
    /// Options with the conventional defaults: sparse storage, auto-managed,
    /// in-order download off.
    pub fn new(save_path: impl Into<PathBuf>) -> Self {
        Self {
            save_path: save_path.into(),
            sparse_storage: true,
            auto_managed: true,
            sequential: false,
            peer_turnover_cutoff: None,
        }
    }

    pub fn with_sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn with_peer_turnover_cutoff(mut self, cutoff: Option<i64>) -> Self {
        self.peer_turnover_cutoff = cutoff;
        self
    }
}

/// Coarse transfer state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Verifying data already on disk.
    Checking,
    /// Waiting for metadata from peers.
    FetchingMetadata,
    Downloading,
    Seeding,
    Paused,
}

/// Point-in-time stats snapshot for one transfer.
#[derive(Debug, Clone)]
pub struct TransferStats {
    pub name: String,
    pub state: EngineState,
    /// Completion fraction in `0.0..=1.0`.
    pub progress: f64,
    pub download_rate: u64,
    pub upload_rate: u64,
    pub num_peers: u32,
    pub num_seeds: u32,
    /// Total bytes the transfer will occupy when done.
    pub total_size: u64,
    /// Bytes of wanted data already present.
    pub downloaded: u64,
    /// Bytes uploaded over the transfer's lifetime.
    pub uploaded: u64,
    /// Bytes downloaded over the transfer's lifetime (ratio denominator).
    pub all_time_download: u64,
}

/// One file in the engine's manifest for a transfer.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    /// Path relative to the transfer's save root.
    pub relative_path: String,
    pub size: u64,
}

/// The consumed interface of the external transfer engine.
///
/// Implementations must tolerate being called for handles the engine no
/// longer knows (returning an engine error) and must not panic on any input.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Submit a transfer. Returns a handle usable with every other method.
    async fn add(&self, source: &TorrentSource, opts: &AddTorrentOptions)
    -> Result<TorrentHandle>;

    /// Query a stats snapshot for an active transfer.
    async fn stats(&self, handle: &TorrentHandle) -> Result<TransferStats>;

    async fn pause(&self, handle: &TorrentHandle) -> Result<()>;

    async fn resume(&self, handle: &TorrentHandle) -> Result<()>;

    /// Toggle the engine's queue management for this transfer.
    async fn set_auto_managed(&self, handle: &TorrentHandle, enabled: bool) -> Result<()>;

    /// Cap upload bandwidth in bytes/s. `None` removes the cap.
    async fn set_upload_limit(&self, handle: &TorrentHandle, limit: Option<u64>) -> Result<()>;

    /// Cap concurrent upload slots. `None` removes the cap.
    async fn set_upload_slots(&self, handle: &TorrentHandle, slots: Option<u32>) -> Result<()>;

    /// Cap peer connections. `None` removes the cap.
    async fn set_connection_limit(&self, handle: &TorrentHandle, limit: Option<u32>)
    -> Result<()>;

    /// Raise or lower scheduling priority. `255` is the maximum.
    async fn set_priority(&self, handle: &TorrentHandle, priority: u8) -> Result<()>;

    /// Toggle the engine's wide-distribution (super-seeding) flag.
    async fn set_wide_distribution(&self, handle: &TorrentHandle, enabled: bool) -> Result<()>;

    /// Register an additional tracker at the given priority tier.
    async fn add_tracker(&self, handle: &TorrentHandle, url: &str, tier: u32) -> Result<()>;

    /// Force an immediate announce to all trackers.
    async fn reannounce(&self, handle: &TorrentHandle) -> Result<()>;

    /// Enumerate the transfer's file manifest.
    async fn file_manifest(&self, handle: &TorrentHandle) -> Result<Vec<ManifestEntry>>;

    /// Remove the transfer from the engine, optionally deleting its files.
    async fn remove(&self, handle: &TorrentHandle, delete_files: bool) -> Result<()>;

    /// Quiesce the engine ahead of process shutdown.
    async fn shutdown(&self) -> Result<()>;
}
