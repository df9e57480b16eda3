//! Transfer engine integration.
//!
//! The engine itself is an external collaborator; everything in this crate
//! reaches it through the [`TorrentEngine`] trait. [`gateway::EngineGateway`]
//! is the façade the orchestration layer uses, and [`transmission`] holds the
//! RPC client the shipped binary wires in.

pub mod gateway;
pub mod traits;
pub mod transmission;

pub use gateway::EngineGateway;
pub use traits::{
    AddTorrentOptions, EngineState, ManifestEntry, TorrentEngine, TorrentHandle, TorrentSource,
    TransferStats,
};
pub use transmission::TransmissionEngine;
