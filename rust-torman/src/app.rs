//! Application context: service wiring, submission orchestration, teardown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::archive::ArchiveCache;
use crate::config::AppConfig;
use crate::engine::{
    AddTorrentOptions, EngineGateway, TorrentEngine, TorrentSource, TransferStats,
};
use crate::error::Result;
use crate::ingest::{self, IngestClassifier, Locator};
use crate::jobs::{
    CompletionDetector, JobId, JobPhase, JobRecord, JobRegistry, JobSnapshot, JobSource, Monitor,
};
use crate::push::Broadcaster;
use crate::serve::FileServer;

/// Everything the request handlers and background tasks share, constructed
/// once at startup and torn down explicitly.
pub struct AppContext {
    pub config: AppConfig,
    pub gateway: Arc<EngineGateway>,
    pub registry: Arc<JobRegistry>,
    pub archive: Arc<ArchiveCache>,
    pub broadcaster: Arc<Broadcaster>,
    pub file_server: FileServer,
    pub ingest: IngestClassifier,
    /// Pulls the next monitor tick forward after a successful submission.
    pub wake: Arc<Notify>,
    pub started_at: Instant,
    shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(config: AppConfig, engine: Arc<dyn TorrentEngine>) -> Result<Self> {
        let gateway = Arc::new(EngineGateway::new(engine, config.max_connections));
        let archive = Arc::new(ArchiveCache::new(config.temp_dir.clone()));
        let registry = Arc::new(JobRegistry::new(gateway.clone(), archive.clone()));
        let file_server = FileServer::new(registry.clone(), gateway.clone(), archive.clone());

        Ok(Self {
            ingest: IngestClassifier::new()?,
            gateway,
            registry,
            archive,
            broadcaster: Arc::new(Broadcaster::new()),
            file_server,
            wake: Arc::new(Notify::new()),
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
            config,
        })
    }

    /// Build the periodic monitor wired to this context. Cancelled by
    /// [`AppContext::teardown`].
    pub fn build_monitor(&self) -> Monitor {
        let detector = CompletionDetector::new(
            self.gateway.clone(),
            self.registry.clone(),
            self.archive.clone(),
        );
        Monitor::new(
            self.registry.clone(),
            self.gateway.clone(),
            detector,
            self.broadcaster.clone(),
            self.wake.clone(),
            self.config.monitor_interval,
            self.shutdown.child_token(),
        )
    }

    /// Token cancelled on teardown; the API server shares it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop the periodic task and quiesce the engine.
    pub async fn teardown(&self) {
        info!("shutting down");
        self.shutdown.cancel();
        if let Err(e) = self.gateway.shutdown().await {
            warn!(error = %e, "could not quiesce engine during shutdown");
        }
    }

    /// Submit a job from a locator string (magnet link, torrent URL, or
    /// info hash).
    pub async fn submit_locator(
        &self,
        locator: &str,
        save_path: Option<String>,
        sequential: bool,
    ) -> Result<JobId> {
        let id = JobId::generate();

        let (source, engine_source, descriptor_path) = match ingest::classify(locator)? {
            Locator::Magnet(uri) => {
                let engine_source = TorrentSource::MagnetUri(uri.clone());
                (JobSource::Magnet { uri }, engine_source, None)
            }
            Locator::InfoHash(hash) => {
                let engine_source =
                    TorrentSource::MagnetUri(format!("magnet:?xt=urn:btih:{hash}"));
                (JobSource::InfoHash { hash }, engine_source, None)
            }
            Locator::DescriptorUrl(url) => {
                let bytes = self.ingest.fetch_descriptor(&url).await?;
                let path = self.retain_descriptor(&id, &bytes).await?;
                (
                    JobSource::DescriptorUrl { url },
                    TorrentSource::Metainfo(bytes),
                    Some(path),
                )
            }
        };

        self.register_submission(id, source, engine_source, descriptor_path, save_path, sequential)
            .await
    }

    /// Submit a job from raw torrent file bytes (the upload path, which
    /// bypasses the fetch step entirely).
    pub async fn submit_descriptor_bytes(
        &self,
        bytes: Vec<u8>,
        save_path: Option<String>,
        sequential: bool,
    ) -> Result<JobId> {
        ingest::validate_descriptor_bytes(&bytes)?;

        let id = JobId::generate();
        let path = self.retain_descriptor(&id, &bytes).await?;

        self.register_submission(
            id,
            JobSource::UploadedFile,
            TorrentSource::Metainfo(bytes),
            Some(path),
            save_path,
            sequential,
        )
        .await
    }

    /// Pause an active job. Completed and unknown ids both miss.
    pub async fn pause_job(&self, id: &JobId) -> Result<()> {
        let handle = self.registry.active_handle(id)?;
        self.gateway.pause(&handle).await
    }

    /// Resume an active job.
    pub async fn resume_job(&self, id: &JobId) -> Result<()> {
        let handle = self.registry.active_handle(id)?;
        self.gateway.resume(&handle).await
    }

    async fn retain_descriptor(&self, id: &JobId, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.config.descriptor_path(id);
        if let Some(parent) = path.parent() {
            crate::utils::fs::ensure_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    async fn register_submission(
        &self,
        id: JobId,
        source: JobSource,
        engine_source: TorrentSource,
        descriptor_path: Option<PathBuf>,
        save_path: Option<String>,
        sequential: bool,
    ) -> Result<JobId> {
        let save_path = save_path
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config.download_dir.clone());

        let opts = AddTorrentOptions::new(&save_path)
            .with_sequential(sequential)
            .with_peer_turnover_cutoff(self.config.peer_turnover_cutoff);

        let handle = match self.gateway.submit(&engine_source, &opts).await {
            Ok(handle) => handle,
            Err(e) => {
                // A failed submission leaves no descriptor artifact behind.
                if let Some(path) = &descriptor_path {
                    let _ = tokio::fs::remove_file(path).await;
                }
                return Err(e);
            }
        };

        self.gateway.apply_boost(&handle).await;

        let added_at = Utc::now();
        let last = match self.gateway.stats(&handle).await {
            Ok(stats) => JobSnapshot::from_stats(id, &stats, &save_path, added_at),
            // The engine may not answer immediately after an add; start from
            // an empty snapshot and let the next tick fill it in.
            Err(_) => JobSnapshot::from_stats(
                id,
                &TransferStats {
                    name: String::new(),
                    state: crate::engine::EngineState::FetchingMetadata,
                    progress: 0.0,
                    download_rate: 0,
                    upload_rate: 0,
                    num_peers: 0,
                    num_seeds: 0,
                    total_size: 0,
                    downloaded: 0,
                    uploaded: 0,
                    all_time_download: 0,
                },
                &save_path,
                added_at,
            ),
        };

        self.registry.insert(JobRecord {
            id,
            added_at,
            save_path,
            descriptor_path,
            source: source.clone(),
            phase: JobPhase::Active { handle, last },
        });

        info!(job = %id, source = source.kind(), "job submitted");

        // Let connected clients see the new job without waiting a full tick.
        self.wake.notify_one();

        Ok(id)
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
