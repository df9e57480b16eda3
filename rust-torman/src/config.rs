//! Application configuration loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the orchestration service.
///
/// Every field has a default so the service starts with no environment at
/// all; `from_env_or_default` overrides individual fields from env vars.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root directory for downloaded job content.
    pub download_dir: PathBuf,
    /// Directory where fetched/uploaded torrent files are retained.
    pub torrent_dir: PathBuf,
    /// Directory for cached archives and other scratch files.
    pub temp_dir: PathBuf,
    /// Transmission RPC endpoint of the external engine.
    pub engine_url: String,
    /// Monitor tick cadence.
    pub monitor_interval: Duration,
    /// Per-job connection cap applied by the boost pass.
    pub max_connections: u32,
    /// Engine tuning value passed through to the engine unchanged.
    ///
    /// The source configuration is ambiguous about whether this is a
    /// percentage or a raw count, so it is never interpreted here.
    pub peer_turnover_cutoff: Option<i64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("/srv/torman/downloads"),
            torrent_dir: PathBuf::from("/srv/torman/torrents"),
            temp_dir: PathBuf::from("/srv/torman/temp"),
            engine_url: "http://127.0.0.1:9091/transmission/rpc".to_string(),
            monitor_interval: Duration::from_millis(500),
            max_connections: 300,
            peer_turnover_cutoff: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Supported env vars: `DOWNLOAD_DIR`, `TORRENT_DIR`, `TEMP_DIR`,
    /// `ENGINE_URL`, `MONITOR_INTERVAL_MS`, `MAX_CONNECTIONS`,
    /// `PEER_TURNOVER_CUTOFF`.
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("DOWNLOAD_DIR")
            && !dir.trim().is_empty()
        {
            config.download_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("TORRENT_DIR")
            && !dir.trim().is_empty()
        {
            config.torrent_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("TEMP_DIR")
            && !dir.trim().is_empty()
        {
            config.temp_dir = PathBuf::from(dir);
        }

        if let Ok(url) = std::env::var("ENGINE_URL")
            && !url.trim().is_empty()
        {
            config.engine_url = url;
        }

        if let Ok(ms) = std::env::var("MONITOR_INTERVAL_MS")
            && let Ok(parsed) = ms.parse::<u64>()
            && parsed > 0
        {
            config.monitor_interval = Duration::from_millis(parsed);
        }

        if let Ok(conns) = std::env::var("MAX_CONNECTIONS")
            && let Ok(parsed) = conns.parse::<u32>()
        {
            config.max_connections = parsed;
        }

        if let Ok(cutoff) = std::env::var("PEER_TURNOVER_CUTOFF")
            && let Ok(parsed) = cutoff.parse::<i64>()
        {
            config.peer_turnover_cutoff = Some(parsed);
        }

        config
    }

    /// Create the download/torrent/temp directories if missing.
    pub async fn ensure_directories(&self) -> crate::Result<()> {
        for dir in [&self.download_dir, &self.torrent_dir, &self.temp_dir] {
            crate::utils::fs::ensure_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Path of the retained torrent file for a job.
    pub fn descriptor_path(&self, id: &crate::jobs::JobId) -> PathBuf {
        self.torrent_dir.join(format!("{id}.torrent"))
    }
}
