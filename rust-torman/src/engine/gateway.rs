//! Thin façade over the external transfer engine.
//!
//! The gateway owns the engine trait object and exposes the operations the
//! orchestration layer needs. Best-effort optimizations (`apply_boost`,
//! `enable_wide_distribution`) are fallible internally but never fail the
//! operation they accompany; their errors are logged and discarded here.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::Result;

use super::traits::{
    AddTorrentOptions, ManifestEntry, TorrentEngine, TorrentHandle, TorrentSource, TransferStats,
};

/// Public trackers registered on every submission for wider peer discovery.
pub const PUBLIC_TRACKERS: &[&str] = &[
    "udp://tracker.opentrackr.org:1337/announce",
    "udp://open.stealth.si:80/announce",
    "udp://tracker.torrent.eu.org:451/announce",
    "udp://tracker.bittor.pw:1337/announce",
    "udp://public.popcorn-tracker.org:6969/announce",
    "udp://tracker.dler.org:6969/announce",
    "udp://exodus.desync.com:6969/announce",
    "udp://open.demonii.com:1337/announce",
    "udp://tracker.openbittorrent.com:6969/announce",
    "udp://tracker.coppersurfer.tk:6969/announce",
    "udp://tracker.leechers-paradise.org:6969/announce",
    "udp://tracker.internetwarriors.net:1337/announce",
    "udp://9.rarbg.to:2710/announce",
    "udp://9.rarbg.me:2710/announce",
    "udp://tracker.cyberia.is:6969/announce",
    "udp://retracker.lanta-net.ru:2710/announce",
    "udp://bt.xxx-tracker.com:2710/announce",
    "http://tracker.openbittorrent.com:80/announce",
    "udp://opentor.org:2710/announce",
];

/// Maximum scheduling priority applied by the boost pass.
const MAX_PRIORITY: u8 = 255;

/// Façade over `Arc<dyn TorrentEngine>`.
pub struct EngineGateway {
    engine: Arc<dyn TorrentEngine>,
    /// Per-transfer connection cap applied by the boost pass.
    max_connections: u32,
}

impl EngineGateway {
    pub fn new(engine: Arc<dyn TorrentEngine>, max_connections: u32) -> Self {
        Self {
            engine,
            max_connections,
        }
    }

    /// Submit a transfer to the engine.
    pub async fn submit(
        &self,
        source: &TorrentSource,
        opts: &AddTorrentOptions,
    ) -> Result<TorrentHandle> {
        self.engine.add(source, opts).await
    }

    /// Current stats snapshot for an active transfer.
    pub async fn stats(&self, handle: &TorrentHandle) -> Result<TransferStats> {
        self.engine.stats(handle).await
    }

    /// Pause a transfer and keep it paused until an explicit resume by
    /// disabling the engine's queue auto-management first.
    pub async fn pause(&self, handle: &TorrentHandle) -> Result<()> {
        if let Err(e) = self.engine.set_auto_managed(handle, false).await {
            debug!(%handle, error = %e, "could not disable auto-management before pause");
        }
        self.engine.pause(handle).await
    }

    /// Resume a transfer, handing it back to the engine's queue management.
    pub async fn resume(&self, handle: &TorrentHandle) -> Result<()> {
        if let Err(e) = self.engine.set_auto_managed(handle, true).await {
            debug!(%handle, error = %e, "could not re-enable auto-management before resume");
        }
        self.engine.resume(handle).await
    }

    /// Enumerate the transfer's file manifest.
    pub async fn file_manifest(&self, handle: &TorrentHandle) -> Result<Vec<ManifestEntry>> {
        self.engine.file_manifest(handle).await
    }

    /// Remove a transfer from the engine, optionally deleting its files.
    pub async fn remove(&self, handle: &TorrentHandle, delete_files: bool) -> Result<()> {
        self.engine.remove(handle, delete_files).await
    }

    /// Detach a completed transfer from the engine, keeping its files on
    /// disk. Irreversible: the handle is dead afterward.
    pub async fn detach(&self, handle: &TorrentHandle) -> Result<()> {
        self.engine.remove(handle, false).await
    }

    /// Quiesce a transfer that has finished: stop it, zero its upload
    /// allowance and slot count, and clear the wide-distribution flag.
    /// Each step is attempted independently.
    pub async fn quiesce(&self, handle: &TorrentHandle) {
        if let Err(e) = self.engine.pause(handle).await {
            warn!(%handle, error = %e, "failed to pause completed transfer");
        }
        if let Err(e) = self.engine.set_upload_limit(handle, Some(0)).await {
            debug!(%handle, error = %e, "failed to zero upload limit");
        }
        if let Err(e) = self.engine.set_upload_slots(handle, Some(0)).await {
            debug!(%handle, error = %e, "failed to zero upload slots");
        }
        if let Err(e) = self.engine.set_wide_distribution(handle, false).await {
            debug!(%handle, error = %e, "failed to clear wide-distribution flag");
        }
    }

    /// Apply peer-discovery and scheduling optimizations to a fresh
    /// submission. Boosting is an optimization, not correctness-critical:
    /// failures are logged and swallowed.
    pub async fn apply_boost(&self, handle: &TorrentHandle) {
        if let Err(e) = self.try_apply_boost(handle).await {
            warn!(%handle, error = %e, "failed to boost transfer");
        }
    }

    async fn try_apply_boost(&self, handle: &TorrentHandle) -> Result<()> {
        for tracker in PUBLIC_TRACKERS {
            self.engine.add_tracker(handle, tracker, 0).await?;
        }
        self.engine.reannounce(handle).await?;
        self.engine
            .set_connection_limit(handle, Some(self.max_connections))
            .await?;
        self.engine.set_upload_slots(handle, None).await?;
        self.engine.set_upload_limit(handle, None).await?;
        self.engine.set_priority(handle, MAX_PRIORITY).await?;

        debug!(
            %handle,
            trackers = PUBLIC_TRACKERS.len(),
            max_connections = self.max_connections,
            "boost applied"
        );
        Ok(())
    }

    /// Switch a fully downloaded transfer into wide-distribution mode.
    /// Silently skipped while the transfer is still incomplete; failures are
    /// logged and swallowed.
    pub async fn enable_wide_distribution(&self, handle: &TorrentHandle) {
        if let Err(e) = self.try_enable_wide_distribution(handle).await {
            warn!(%handle, error = %e, "failed to enable wide distribution");
        }
    }

    async fn try_enable_wide_distribution(&self, handle: &TorrentHandle) -> Result<()> {
        let stats = self.engine.stats(handle).await?;
        if stats.progress < 1.0 {
            debug!(%handle, progress = stats.progress, "not complete, skipping wide distribution");
            return Ok(());
        }

        self.engine.set_wide_distribution(handle, true).await?;
        self.engine.reannounce(handle).await?;
        self.engine.set_upload_limit(handle, None).await?;
        self.engine.set_upload_slots(handle, None).await?;
        Ok(())
    }

    /// Quiesce the engine ahead of process shutdown.
    pub async fn shutdown(&self) -> Result<()> {
        self.engine.shutdown().await
    }
}
