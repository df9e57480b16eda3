//! Transmission RPC engine client.
//!
//! The shipped binary drives a Transmission daemon over its JSON-RPC
//! endpoint. Handles are the daemon's torrent hash strings. Operations the
//! daemon has no equivalent for (upload slots, wide distribution, queue
//! auto-management) are accepted and ignored so the orchestration layer's
//! best-effort passes stay quiet.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

use super::traits::{
    AddTorrentOptions, EngineState, ManifestEntry, TorrentEngine, TorrentHandle, TorrentSource,
    TransferStats,
};

const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";

/// Stats fields requested from `torrent-get`.
const STATS_FIELDS: &[&str] = &[
    "name",
    "status",
    "percentDone",
    "rateDownload",
    "rateUpload",
    "peersConnected",
    "peersSendingToUs",
    "sizeWhenDone",
    "haveValid",
    "haveUnchecked",
    "downloadedEver",
    "uploadedEver",
];

/// Transmission RPC client implementing [`TorrentEngine`].
pub struct TransmissionEngine {
    client: reqwest::Client,
    endpoint: String,
    /// CSRF session id, learned from the daemon's 409 handshake.
    session_id: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct AddedTorrent {
    #[serde(rename = "hashString")]
    hash_string: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TorrentFields {
    name: String,
    status: i64,
    #[serde(rename = "percentDone")]
    percent_done: f64,
    #[serde(rename = "rateDownload")]
    rate_download: i64,
    #[serde(rename = "rateUpload")]
    rate_upload: i64,
    #[serde(rename = "peersConnected")]
    peers_connected: i64,
    #[serde(rename = "peersSendingToUs")]
    peers_sending_to_us: i64,
    #[serde(rename = "sizeWhenDone")]
    size_when_done: i64,
    #[serde(rename = "haveValid")]
    have_valid: i64,
    #[serde(rename = "haveUnchecked")]
    have_unchecked: i64,
    #[serde(rename = "downloadedEver")]
    downloaded_ever: i64,
    #[serde(rename = "uploadedEver")]
    uploaded_ever: i64,
    files: Vec<TorrentFile>,
}

#[derive(Debug, Deserialize)]
struct TorrentFile {
    name: String,
    length: i64,
}

impl TransmissionEngine {
    /// Connect to a Transmission RPC endpoint, e.g.
    /// `http://127.0.0.1:9091/transmission/rpc`.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::engine(format!("failed to build engine HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            session_id: Mutex::new(None),
        })
    }

    /// Perform one RPC call, transparently redoing the 409 session handshake.
    async fn call(&self, method: &str, arguments: Value) -> Result<Value> {
        let body = json!({ "method": method, "arguments": arguments });

        for _ in 0..2 {
            let mut request = self.client.post(&self.endpoint).json(&body);
            if let Some(sid) = self.session_id.lock().clone() {
                request = request.header(SESSION_ID_HEADER, sid);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::engine(format!("{method}: {e}")))?;

            if response.status() == reqwest::StatusCode::CONFLICT {
                let Some(sid) = response
                    .headers()
                    .get(SESSION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                else {
                    return Err(Error::engine("409 handshake without a session id"));
                };
                *self.session_id.lock() = Some(sid.to_string());
                continue;
            }

            if !response.status().is_success() {
                return Err(Error::engine(format!(
                    "{method}: engine returned HTTP {}",
                    response.status()
                )));
            }

            let envelope: RpcEnvelope = response
                .json()
                .await
                .map_err(|e| Error::engine(format!("{method}: invalid RPC response: {e}")))?;

            if envelope.result != "success" {
                return Err(Error::engine(format!("{method}: {}", envelope.result)));
            }
            return Ok(envelope.arguments);
        }

        Err(Error::engine("engine session handshake failed"))
    }

    /// Shorthand for calls addressing one torrent.
    async fn call_for(&self, method: &str, handle: &TorrentHandle, mut args: Value) -> Result<()> {
        args["ids"] = json!([handle.as_str()]);
        self.call(method, args).await?;
        Ok(())
    }

    async fn get_fields(&self, handle: &TorrentHandle, fields: &[&str]) -> Result<TorrentFields> {
        let args = self
            .call(
                "torrent-get",
                json!({ "ids": [handle.as_str()], "fields": fields }),
            )
            .await?;

        let mut torrents: Vec<TorrentFields> =
            serde_json::from_value(args.get("torrents").cloned().unwrap_or(Value::Null))
                .map_err(|e| Error::engine(format!("torrent-get: malformed torrent list: {e}")))?;

        if torrents.is_empty() {
            return Err(Error::engine(format!(
                "engine no longer knows transfer {handle}"
            )));
        }
        Ok(torrents.remove(0))
    }
}

fn map_state(fields: &TorrentFields) -> EngineState {
    match fields.status {
        0 => EngineState::Paused,
        1 | 2 => EngineState::Checking,
        3 | 4 if fields.size_when_done == 0 => EngineState::FetchingMetadata,
        3 | 4 => EngineState::Downloading,
        _ => EngineState::Seeding,
    }
}

#[async_trait]
impl TorrentEngine for TransmissionEngine {
    async fn add(&self, source: &TorrentSource, opts: &AddTorrentOptions) -> Result<TorrentHandle> {
        let mut args = json!({
            "download-dir": opts.save_path.to_string_lossy(),
            "paused": false,
        });
        match source {
            TorrentSource::MagnetUri(uri) => args["filename"] = json!(uri),
            TorrentSource::Metainfo(bytes) => args["metainfo"] = json!(BASE64.encode(bytes)),
        }
        if opts.sequential {
            args["sequential_download"] = json!(true);
        }

        let arguments = self.call("torrent-add", args).await?;

        if arguments.get("torrent-duplicate").is_some() {
            return Err(Error::engine("transfer is already registered"));
        }
        let added: AddedTorrent = serde_json::from_value(
            arguments
                .get("torrent-added")
                .cloned()
                .unwrap_or(Value::Null),
        )
        .map_err(|e| Error::engine(format!("torrent-add: malformed response: {e}")))?;

        Ok(TorrentHandle::new(added.hash_string))
    }

    async fn stats(&self, handle: &TorrentHandle) -> Result<TransferStats> {
        let fields = self.get_fields(handle, STATS_FIELDS).await?;
        Ok(TransferStats {
            state: map_state(&fields),
            name: fields.name,
            progress: fields.percent_done.clamp(0.0, 1.0),
            download_rate: fields.rate_download.max(0) as u64,
            upload_rate: fields.rate_upload.max(0) as u64,
            num_peers: fields.peers_connected.max(0) as u32,
            num_seeds: fields.peers_sending_to_us.max(0) as u32,
            total_size: fields.size_when_done.max(0) as u64,
            downloaded: (fields.have_valid + fields.have_unchecked).max(0) as u64,
            uploaded: fields.uploaded_ever.max(0) as u64,
            all_time_download: fields.downloaded_ever.max(0) as u64,
        })
    }

    async fn pause(&self, handle: &TorrentHandle) -> Result<()> {
        self.call_for("torrent-stop", handle, json!({})).await
    }

    async fn resume(&self, handle: &TorrentHandle) -> Result<()> {
        self.call_for("torrent-start", handle, json!({})).await
    }

    async fn set_auto_managed(&self, handle: &TorrentHandle, enabled: bool) -> Result<()> {
        // Transmission has no per-torrent queue-management toggle; stopped
        // torrents already stay stopped until started explicitly.
        debug!(%handle, enabled, "auto-management not supported by engine, ignoring");
        Ok(())
    }

    async fn set_upload_limit(&self, handle: &TorrentHandle, limit: Option<u64>) -> Result<()> {
        let args = match limit {
            // The daemon takes KB/s.
            Some(bytes) => json!({ "uploadLimited": true, "uploadLimit": bytes / 1024 }),
            None => json!({ "uploadLimited": false }),
        };
        self.call_for("torrent-set", handle, args).await
    }

    async fn set_upload_slots(&self, handle: &TorrentHandle, slots: Option<u32>) -> Result<()> {
        debug!(%handle, ?slots, "per-transfer upload slots not supported by engine, ignoring");
        Ok(())
    }

    async fn set_connection_limit(
        &self,
        handle: &TorrentHandle,
        limit: Option<u32>,
    ) -> Result<()> {
        let args = json!({ "peer-limit": limit.unwrap_or(u32::MAX >> 1) });
        self.call_for("torrent-set", handle, args).await
    }

    async fn set_priority(&self, handle: &TorrentHandle, priority: u8) -> Result<()> {
        let bandwidth_priority = if priority >= 128 { 1 } else { 0 };
        self.call_for(
            "torrent-set",
            handle,
            json!({ "bandwidthPriority": bandwidth_priority }),
        )
        .await
    }

    async fn set_wide_distribution(&self, handle: &TorrentHandle, enabled: bool) -> Result<()> {
        debug!(%handle, enabled, "wide distribution not supported by engine, ignoring");
        Ok(())
    }

    async fn add_tracker(&self, handle: &TorrentHandle, url: &str, _tier: u32) -> Result<()> {
        self.call_for("torrent-set", handle, json!({ "trackerAdd": [url] }))
            .await
    }

    async fn reannounce(&self, handle: &TorrentHandle) -> Result<()> {
        self.call_for("torrent-reannounce", handle, json!({})).await
    }

    async fn file_manifest(&self, handle: &TorrentHandle) -> Result<Vec<ManifestEntry>> {
        let fields = self.get_fields(handle, &["files"]).await?;
        Ok(fields
            .files
            .into_iter()
            .map(|f| ManifestEntry {
                relative_path: f.name,
                size: f.length.max(0) as u64,
            })
            .collect())
    }

    async fn remove(&self, handle: &TorrentHandle, delete_files: bool) -> Result<()> {
        self.call_for(
            "torrent-remove",
            handle,
            json!({ "delete-local-data": delete_files }),
        )
        .await
    }

    async fn shutdown(&self) -> Result<()> {
        // Stop every transfer; the daemon itself stays up.
        self.call("torrent-stop", json!({})).await?;
        Ok(())
    }
}
