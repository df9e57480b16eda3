//! Real-time push fan-out to connected WebSocket clients.
//!
//! Each connected client is an unbounded sender registered here; the socket
//! task on the other end forwards messages to the wire. A send fails only
//! when the socket task is gone, so failed clients are pruned right after
//! the fan-out. No retry, no further backpressure.

use axum::extract::ws::{Message, Utf8Bytes};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::jobs::JobSnapshot;

/// Structured update pushed on every monitor tick.
#[derive(Debug, Serialize)]
struct UpdateMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    torrents: &'a [JobSnapshot],
}

/// Fan-out hub for the push channel.
#[derive(Default)]
pub struct Broadcaster {
    clients: DashMap<Uuid, mpsc::UnboundedSender<Message>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new push client; the returned receiver feeds its socket.
    pub fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.insert(id, tx);
        debug!(client = %id, total = self.clients.len(), "push client connected");
        (id, rx)
    }

    /// Drop a client that closed its connection.
    pub fn unregister(&self, id: &Uuid) {
        if self.clients.remove(id).is_some() {
            debug!(client = %id, total = self.clients.len(), "push client disconnected");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Send the job list to every connected client, pruning clients whose
    /// send fails.
    pub fn broadcast(&self, jobs: &[JobSnapshot]) {
        if self.clients.is_empty() {
            return;
        }

        let payload = match serde_json::to_string(&UpdateMessage {
            kind: "update",
            torrents: jobs,
        }) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "could not serialize job list update");
                return;
            }
        };
        let message = Message::Text(Utf8Bytes::from(payload));

        let mut disconnected = Vec::new();
        for entry in self.clients.iter() {
            if entry.value().send(message.clone()).is_err() {
                disconnected.push(*entry.key());
            }
        }
        for id in disconnected {
            self.unregister(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobId, JobState};
    use chrono::Utc;

    fn snapshot(name: &str) -> JobSnapshot {
        JobSnapshot {
            id: JobId::generate(),
            name: name.to_string(),
            state: JobState::Downloading,
            progress: 25.0,
            download_rate: 100,
            upload_rate: 10,
            num_peers: 3,
            num_seeds: 1,
            total_size: 1000,
            downloaded: 250,
            uploaded: 25,
            ratio: 0.1,
            eta_secs: 7,
            save_path: "/downloads".to_string(),
            added_at: Utc::now(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_clients() {
        let broadcaster = Broadcaster::new();
        let (_, mut rx1) = broadcaster.register();
        let (_, mut rx2) = broadcaster.register();

        broadcaster.broadcast(&[snapshot("one"), snapshot("two")]);

        for rx in [&mut rx1, &mut rx2] {
            let Message::Text(text) = rx.recv().await.unwrap() else {
                panic!("expected a text message");
            };
            let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(value["type"], "update");
            assert_eq!(value["torrents"].as_array().unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_disconnected_clients_are_pruned() {
        let broadcaster = Broadcaster::new();
        let (_, rx1) = broadcaster.register();
        let (_, mut rx2) = broadcaster.register();
        assert_eq!(broadcaster.client_count(), 2);

        drop(rx1);
        broadcaster.broadcast(&[snapshot("one")]);

        assert_eq!(broadcaster.client_count(), 1);
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let broadcaster = Broadcaster::new();
        let (id, _rx) = broadcaster.register();
        broadcaster.unregister(&id);
        broadcaster.unregister(&id);
        assert_eq!(broadcaster.client_count(), 0);
    }
}
