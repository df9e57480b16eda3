//! End-to-end lifecycle tests against an in-memory fake engine: submission,
//! monitoring, completion, downloads, and removal.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use rust_torman::app::AppContext;
use rust_torman::config::AppConfig;
use rust_torman::engine::{
    AddTorrentOptions, EngineState, ManifestEntry, TorrentEngine, TorrentHandle, TorrentSource,
    TransferStats,
};
use rust_torman::error::Error;
use rust_torman::Result as TormanResult;
use rust_torman::jobs::{JobId, JobState, Monitor};
use rust_torman::serve::DownloadContent;

const MAGNET: &str = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567";

struct FakeTorrent {
    stats: TransferStats,
    manifest: Vec<ManifestEntry>,
}

/// Scripted fake of the external transfer engine.
///
/// `expect_torrent` queues the torrent the next `add` call produces; the
/// test then drives progress explicitly.
#[derive(Default)]
struct FakeEngine {
    pending: Mutex<VecDeque<FakeTorrent>>,
    torrents: Mutex<HashMap<String, FakeTorrent>>,
    removed: Mutex<Vec<(String, bool)>>,
    next_handle: AtomicU64,
}

impl FakeEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn expect_torrent(&self, name: &str, manifest: Vec<ManifestEntry>) {
        let total_size = manifest.iter().map(|f| f.size).sum::<u64>().max(1);
        self.pending.lock().push_back(FakeTorrent {
            stats: TransferStats {
                name: name.to_string(),
                state: EngineState::Downloading,
                progress: 0.0,
                download_rate: 1_000_000,
                upload_rate: 20_000,
                num_peers: 12,
                num_seeds: 5,
                total_size,
                downloaded: 0,
                uploaded: 0,
                all_time_download: 0,
            },
            manifest,
        });
    }

    fn set_progress(&self, handle: &str, progress: f64) {
        if let Some(torrent) = self.torrents.lock().get_mut(handle) {
            torrent.stats.progress = progress;
            torrent.stats.downloaded = (torrent.stats.total_size as f64 * progress) as u64;
            torrent.stats.all_time_download = torrent.stats.downloaded;
            torrent.stats.uploaded = torrent.stats.downloaded / 2;
        }
    }

    fn removals(&self) -> Vec<(String, bool)> {
        self.removed.lock().clone()
    }
}

#[async_trait]
impl TorrentEngine for FakeEngine {
    async fn add(
        &self,
        _source: &TorrentSource,
        _opts: &AddTorrentOptions,
    ) -> TormanResult<TorrentHandle> {
        let torrent = self
            .pending
            .lock()
            .pop_front()
            .ok_or_else(|| Error::engine("no scripted torrent for this add"))?;
        let handle = format!("fake-{}", self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.torrents.lock().insert(handle.clone(), torrent);
        Ok(TorrentHandle::new(handle))
    }

    async fn stats(&self, handle: &TorrentHandle) -> TormanResult<TransferStats> {
        self.torrents
            .lock()
            .get(handle.as_str())
            .map(|t| t.stats.clone())
            .ok_or_else(|| Error::engine(format!("unknown handle {handle}")))
    }

    async fn pause(&self, handle: &TorrentHandle) -> TormanResult<()> {
        if let Some(torrent) = self.torrents.lock().get_mut(handle.as_str()) {
            torrent.stats.state = EngineState::Paused;
        }
        Ok(())
    }

    async fn resume(&self, handle: &TorrentHandle) -> TormanResult<()> {
        if let Some(torrent) = self.torrents.lock().get_mut(handle.as_str()) {
            torrent.stats.state = EngineState::Downloading;
        }
        Ok(())
    }

    async fn set_auto_managed(&self, _handle: &TorrentHandle, _enabled: bool) -> TormanResult<()> {
        Ok(())
    }

    async fn set_upload_limit(
        &self,
        _handle: &TorrentHandle,
        _limit: Option<u64>,
    ) -> TormanResult<()> {
        Ok(())
    }

    async fn set_upload_slots(
        &self,
        _handle: &TorrentHandle,
        _slots: Option<u32>,
    ) -> TormanResult<()> {
        Ok(())
    }

    async fn set_connection_limit(
        &self,
        _handle: &TorrentHandle,
        _limit: Option<u32>,
    ) -> TormanResult<()> {
        Ok(())
    }

    async fn set_priority(&self, _handle: &TorrentHandle, _priority: u8) -> TormanResult<()> {
        Ok(())
    }

    async fn set_wide_distribution(
        &self,
        _handle: &TorrentHandle,
        _enabled: bool,
    ) -> TormanResult<()> {
        Ok(())
    }

    async fn add_tracker(&self, _handle: &TorrentHandle, _url: &str, _tier: u32) -> TormanResult<()> {
        Ok(())
    }

    async fn reannounce(&self, _handle: &TorrentHandle) -> TormanResult<()> {
        Ok(())
    }

    async fn file_manifest(&self, handle: &TorrentHandle) -> TormanResult<Vec<ManifestEntry>> {
        self.torrents
            .lock()
            .get(handle.as_str())
            .map(|t| t.manifest.clone())
            .ok_or_else(|| Error::engine(format!("unknown handle {handle}")))
    }

    async fn remove(&self, handle: &TorrentHandle, delete_files: bool) -> TormanResult<()> {
        self.torrents.lock().remove(handle.as_str());
        self.removed
            .lock()
            .push((handle.as_str().to_string(), delete_files));
        Ok(())
    }

    async fn shutdown(&self) -> TormanResult<()> {
        Ok(())
    }
}

struct Harness {
    _temp: TempDir,
    engine: Arc<FakeEngine>,
    context: Arc<AppContext>,
    monitor: Monitor,
    download_dir: PathBuf,
}

fn harness() -> Harness {
    let temp = TempDir::new().unwrap();
    let download_dir = temp.path().join("downloads");
    let config = AppConfig {
        download_dir: download_dir.clone(),
        torrent_dir: temp.path().join("torrents"),
        temp_dir: temp.path().join("temp"),
        ..AppConfig::default()
    };
    std::fs::create_dir_all(&download_dir).unwrap();

    let engine = FakeEngine::new();
    let context = Arc::new(AppContext::new(config, engine.clone()).unwrap());
    let monitor = context.build_monitor();
    Harness {
        _temp: temp,
        engine,
        context,
        monitor,
        download_dir,
    }
}

fn manifest_entry(relative: &str, size: u64) -> ManifestEntry {
    ManifestEntry {
        relative_path: relative.to_string(),
        size,
    }
}

fn write_content(download_dir: &Path, relative: &str, contents: &[u8]) {
    let absolute = download_dir.join(relative);
    std::fs::create_dir_all(absolute.parent().unwrap()).unwrap();
    std::fs::write(absolute, contents).unwrap();
}

#[tokio::test]
async fn submitted_job_is_listed_with_engine_status() {
    let h = harness();
    h.engine
        .expect_torrent("fresh job", vec![manifest_entry("fresh/a.bin", 100)]);

    let id = h.context.submit_locator(MAGNET, None, false).await.unwrap();

    let listed = h.context.registry.merged_view();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].name, "fresh job");
    assert_eq!(listed[0].state, JobState::Downloading);
    assert_eq!(listed[0].progress, 0.0);
}

#[tokio::test]
async fn job_ids_are_unique_across_submissions() {
    let h = harness();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..5 {
        h.engine.expect_torrent("job", Vec::new());
        let id = h.context.submit_locator(MAGNET, None, false).await.unwrap();
        assert!(seen.insert(id.to_string()));
    }
    assert_eq!(h.context.registry.active_count(), 5);
}

#[tokio::test]
async fn finished_job_moves_to_completed_on_next_tick() {
    let h = harness();
    h.engine
        .expect_torrent("one file", vec![manifest_entry("solo.bin", 8)]);
    write_content(&h.download_dir, "solo.bin", b"all done");

    let id = h.context.submit_locator(MAGNET, None, false).await.unwrap();
    h.monitor.tick().await;
    assert_eq!(h.context.registry.active_count(), 1);

    h.engine.set_progress("fake-0", 1.0);
    h.monitor.tick().await;

    assert_eq!(h.context.registry.active_count(), 0);
    let snapshot = h.context.registry.snapshot_of(&id).unwrap();
    assert_eq!(snapshot.state, JobState::Completed);
    assert_eq!(snapshot.progress, 100.0);
    assert_eq!(snapshot.download_rate, 0);
    assert_eq!(snapshot.upload_rate, 0);
    assert_eq!(snapshot.num_peers, 0);
    assert!(snapshot.completed_at.is_some());

    // Detached from the engine without deleting files.
    assert_eq!(h.engine.removals(), vec![("fake-0".to_string(), false)]);
    assert!(h.download_dir.join("solo.bin").exists());
}

#[tokio::test]
async fn completed_multi_file_job_downloads_as_archive() {
    let h = harness();
    let manifest = vec![
        manifest_entry("pack/one.txt", 3),
        manifest_entry("pack/two.txt", 3),
        manifest_entry("pack/sub/three.txt", 5),
    ];
    h.engine.expect_torrent("file pack", manifest);
    write_content(&h.download_dir, "pack/one.txt", b"one");
    write_content(&h.download_dir, "pack/two.txt", b"two");
    write_content(&h.download_dir, "pack/sub/three.txt", b"three");

    let id = h.context.submit_locator(MAGNET, None, false).await.unwrap();
    h.engine.set_progress("fake-0", 1.0);
    h.monitor.tick().await;

    // The completion pass pre-built the archive.
    assert!(h.context.archive.archive_path(&id).exists());

    match h.context.file_server.resolve(&id, None).await.unwrap() {
        DownloadContent::Archive { path, file_name } => {
            assert_eq!(file_name, "file pack.zip");
            let mut archive =
                zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
            let mut names: Vec<String> = (0..archive.len())
                .map(|i| archive.by_index(i).unwrap().name().to_string())
                .collect();
            names.sort();
            assert_eq!(
                names,
                vec![
                    "pack/one.txt".to_string(),
                    "pack/sub/three.txt".to_string(),
                    "pack/two.txt".to_string(),
                ]
            );
        }
        other => panic!("expected archive, got {other:?}"),
    }
}

#[tokio::test]
async fn specific_file_download_returns_raw_bytes() {
    let h = harness();
    let manifest = vec![
        manifest_entry("pack/one.txt", 3),
        manifest_entry("pack/two.txt", 3),
    ];
    h.engine.expect_torrent("file pack", manifest);
    write_content(&h.download_dir, "pack/one.txt", b"one");
    write_content(&h.download_dir, "pack/two.txt", b"two");

    let id = h.context.submit_locator(MAGNET, None, false).await.unwrap();
    h.engine.set_progress("fake-0", 1.0);
    h.monitor.tick().await;

    match h
        .context
        .file_server
        .resolve(&id, Some("pack/two.txt"))
        .await
        .unwrap()
    {
        DownloadContent::File(entry) => {
            assert_eq!(std::fs::read(&entry.absolute_path).unwrap(), b"two");
        }
        other => panic!("expected file, got {other:?}"),
    }

    // Unknown job id is a registry miss.
    let unknown: JobId = uuid::Uuid::new_v4().into();
    assert!(matches!(
        h.context.file_server.resolve(&unknown, None).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn traversal_selectors_rejected_even_when_target_exists() {
    let h = harness();
    h.engine
        .expect_torrent("job", vec![manifest_entry("data.bin", 4)]);
    write_content(&h.download_dir, "data.bin", b"data");
    // The file a traversal would reach actually exists.
    write_content(h.download_dir.parent().unwrap(), "secret", b"secret");

    let id = h.context.submit_locator(MAGNET, None, false).await.unwrap();
    h.engine.set_progress("fake-0", 1.0);
    h.monitor.tick().await;

    for selector in ["../secret", "/etc/hostname"] {
        let result = h.context.file_server.resolve(&id, Some(selector)).await;
        assert!(matches!(result, Err(Error::InvalidPath(_))), "{selector}");
    }
}

#[tokio::test]
async fn removing_completed_job_deletes_files_and_prunes_directories() {
    let h = harness();
    let manifest = vec![
        manifest_entry("album/cd1/track.flac", 5),
        manifest_entry("album/cd2/track.flac", 5),
    ];
    h.engine.expect_torrent("album", manifest);
    write_content(&h.download_dir, "album/cd1/track.flac", b"music");
    write_content(&h.download_dir, "album/cd2/track.flac", b"music");
    // Unrelated sibling keeps the download dir itself alive.
    write_content(&h.download_dir, "keep.txt", b"keep");

    let id = h.context.submit_locator(MAGNET, None, false).await.unwrap();
    h.engine.set_progress("fake-0", 1.0);
    h.monitor.tick().await;
    assert!(h.context.archive.archive_path(&id).exists());

    h.context.registry.remove(&id, true).await.unwrap();

    assert!(!h.download_dir.join("album").exists());
    assert!(h.download_dir.join("keep.txt").exists());
    assert!(!h.context.archive.archive_path(&id).exists());
    assert!(h.context.registry.get(&id).is_err());
}

#[tokio::test]
async fn pause_and_resume_round_trip() {
    let h = harness();
    h.engine.expect_torrent("job", Vec::new());
    let id = h.context.submit_locator(MAGNET, None, false).await.unwrap();

    h.context.pause_job(&id).await.unwrap();
    h.monitor.tick().await;
    assert_eq!(
        h.context.registry.snapshot_of(&id).unwrap().state,
        JobState::Paused
    );

    h.context.resume_job(&id).await.unwrap();
    h.monitor.tick().await;
    assert_eq!(
        h.context.registry.snapshot_of(&id).unwrap().state,
        JobState::Downloading
    );
}

#[tokio::test]
async fn push_clients_receive_updates_each_tick() {
    let h = harness();
    h.engine.expect_torrent("watched job", Vec::new());
    h.context.submit_locator(MAGNET, None, false).await.unwrap();

    let (_, mut updates) = h.context.broadcaster.register();
    h.monitor.tick().await;

    let axum::extract::ws::Message::Text(text) = updates.recv().await.unwrap() else {
        panic!("expected a text update");
    };
    let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(value["type"], "update");
    assert_eq!(value["torrents"][0]["name"], "watched job");
}

#[tokio::test]
async fn teardown_stops_the_monitor() {
    let h = harness();
    let monitor = h.context.build_monitor();
    let task = tokio::spawn(monitor.run());

    h.context.teardown().await;

    tokio::time::timeout(std::time::Duration::from_secs(2), task)
        .await
        .expect("monitor did not stop after teardown")
        .unwrap();
}

#[tokio::test]
async fn completion_is_idempotent_across_extra_ticks() {
    let h = harness();
    h.engine
        .expect_torrent("job", vec![manifest_entry("f.bin", 4)]);
    write_content(&h.download_dir, "f.bin", b"data");

    let id = h.context.submit_locator(MAGNET, None, false).await.unwrap();
    h.engine.set_progress("fake-0", 1.0);
    h.monitor.tick().await;
    let first = h.context.registry.snapshot_of(&id).unwrap();

    h.monitor.tick().await;
    h.monitor.tick().await;

    let after = h.context.registry.snapshot_of(&id).unwrap();
    assert_eq!(first.completed_at, after.completed_at);
    assert_eq!(h.engine.removals().len(), 1);
}
