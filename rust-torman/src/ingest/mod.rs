//! Locator classification and torrent file retrieval.
//!
//! A submission arrives as a free-form locator string: a magnet link, an
//! HTTP(S) URL pointing at a `.torrent` file, or a bare 40-hex info hash.
//! Fetching a `.torrent` over HTTP uses a browser-like request profile since
//! torrent sites routinely block obvious automation.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::info;

use crate::error::{Error, Result};

/// Minimum plausible size of a torrent file in bytes.
const MIN_DESCRIPTOR_LEN: usize = 20;

/// Bencode dictionary marker every torrent file starts with.
const BENCODE_DICT_MARKER: u8 = b'd';

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Trackers embedded in the remediation magnet link suggested when a site
/// blocks the torrent file download.
const REMEDIATION_TRACKERS: &[&str] = &[
    "udp://open.demonii.com:1337/announce",
    "udp://tracker.openbittorrent.com:80",
    "udp://tracker.coppersurfer.tk:6969",
    "udp://glotorrents.pw:6969/announce",
    "udp://tracker.opentrackr.org:1337/announce",
    "udp://torrent.gresille.org:80/announce",
    "udp://p4p.arenabg.com:1337",
    "udp://tracker.leechers-paradise.org:6969",
];

static INFO_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9A-Fa-f]{40})").expect("valid regex"));

/// Classified form of a user-supplied locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A magnet link, submitted to the engine as-is.
    Magnet(String),
    /// An HTTP(S) URL to a torrent file that must be fetched first.
    DescriptorUrl(String),
    /// A bare 40-character hex info hash.
    InfoHash(String),
}

/// Classify a locator string by prefix/shape.
pub fn classify(locator: &str) -> Result<Locator> {
    let trimmed = locator.trim();
    let lower = trimmed.to_ascii_lowercase();

    if lower.starts_with("magnet:") {
        return Ok(Locator::Magnet(trimmed.to_string()));
    }
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(Locator::DescriptorUrl(trimmed.to_string()));
    }
    if trimmed.len() == 40 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(Locator::InfoHash(trimmed.to_string()));
    }

    Err(Error::invalid_input(
        "Expected magnet link, HTTP(S) URL, or 40-character info hash",
    ))
}

/// Extract a 40-hex info hash embedded anywhere in a locator.
pub fn extract_info_hash(locator: &str) -> Option<String> {
    INFO_HASH_RE
        .captures(locator)
        .map(|c| c[1].to_string())
}

/// Build a magnet link for an info hash, carrying the remediation tracker
/// list so the link is usable without a tracker of its own.
pub fn magnet_for_hash(info_hash: &str) -> String {
    let mut magnet = format!("magnet:?xt=urn:btih:{info_hash}&dn=");
    for tracker in REMEDIATION_TRACKERS {
        magnet.push_str("&tr=");
        magnet.push_str(tracker);
    }
    magnet
}

/// Check that a payload looks like a torrent file.
///
/// Rejects empty/too-short payloads and anything not starting with the
/// bencode dictionary marker; markup documents get a distinguishing message
/// since they usually mean the host served a block page.
pub fn validate_descriptor_bytes(bytes: &[u8]) -> Result<()> {
    if bytes.len() < MIN_DESCRIPTOR_LEN {
        return Err(Error::NotADescriptorFile(
            "payload is too small to be a valid torrent file".to_string(),
        ));
    }
    if bytes[0] != BENCODE_DICT_MARKER {
        let preview = String::from_utf8_lossy(&bytes[..bytes.len().min(200)]).to_lowercase();
        if preview.contains("html") || preview.contains('<') {
            return Err(Error::NotADescriptorFile(
                "received an HTML page instead of a torrent file; the site may be blocking \
                 automated downloads"
                    .to_string(),
            ));
        }
        return Err(Error::NotADescriptorFile(
            "payload is not valid bencode".to_string(),
        ));
    }
    Ok(())
}

/// Classifies locators and fetches remote torrent files.
pub struct IngestClassifier {
    client: reqwest::Client,
}

impl IngestClassifier {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::config(format!("failed to build ingest HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Fetch and validate a torrent file from a URL.
    ///
    /// Every failure is terminal for the submission attempt; there is no
    /// retry at this layer.
    pub async fn fetch_descriptor(&self, url: &str) -> Result<Vec<u8>> {
        info!(url, "fetching torrent file");

        let response = match self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.5")
            .header("DNT", "1")
            .header("Upgrade-Insecure-Requests", "1")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .header("Referer", derive_referer(url))
            .send()
            .await
        {
            Ok(response) => response,
            Err(_e) => {
                return Err(Error::RemoteTimeout {
                    url: url.to_string(),
                });
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(blocked_by_host(url));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::RemoteNotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(Error::RemoteHttpError {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|_| Error::RemoteTimeout {
                url: url.to_string(),
            })?
            .to_vec();

        validate_descriptor_bytes(&bytes)?;

        info!(url, len = bytes.len(), "torrent file fetched");
        Ok(bytes)
    }
}

/// 403 handling: when the locator itself carries an info hash, hand the
/// caller a ready-to-use magnet link as remediation.
fn blocked_by_host(url: &str) -> Error {
    match extract_info_hash(url) {
        Some(hash) => Error::BlockedByHost {
            message: "The torrent site is blocking automated downloads. Use the suggested \
                      magnet link instead"
                .to_string(),
            remediation: Some(magnet_for_hash(&hash)),
        },
        None => Error::BlockedByHost {
            message: "The torrent site is blocking automated downloads. Copy the magnet link \
                      from the torrent page, or download the .torrent file in your browser and \
                      upload it here"
                .to_string(),
            remediation: None,
        },
    }
}

/// Referer most browsers would send for a torrent-file click-through.
fn derive_referer(url: &str) -> String {
    if let Some(idx) = url.find("/torrent/") {
        return url[..idx].to_string();
    }
    match url.rsplit_once('/') {
        Some((prefix, _)) if prefix.len() > "https:/".len() => prefix.to_string(),
        _ => url.to_string(),
    }
}
