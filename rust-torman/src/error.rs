//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not a torrent file: {0}")]
    NotADescriptorFile(String),

    #[error("{message}")]
    BlockedByHost {
        message: String,
        /// Magnet link the caller can use instead, when an info hash could
        /// be recovered from the original locator.
        remediation: Option<String>,
    },

    #[error("Torrent not found at {url} (404). The link may be expired")]
    RemoteNotFound { url: String },

    #[error("Download of {url} timed out. The server may be slow or unavailable")]
    RemoteTimeout { url: String },

    #[error("HTTP {status} while fetching {url}")]
    RemoteHttpError { status: u16, url: String },

    #[error("Torrent {id} not found")]
    NotFound { id: String },

    #[error("No files available yet for torrent {id}; the transfer may still be downloading")]
    NoFilesOnDisk { id: String },

    #[error("Requested file {path} not found in torrent contents")]
    FileNotFound { path: String },

    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    #[error("Archive build failed: {0}")]
    ArchiveBuild(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    pub fn archive(msg: impl Into<String>) -> Self {
        Self::ArchiveBuild(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
