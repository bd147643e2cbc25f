//! Connection hub: the WebSocket side of the transport contract

use dashmap::DashMap;
use livelens_core::{Blob, ConnectionId, Transport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::blob::BlobStore;

/// Routes outbound messages to per-connection writer queues
///
/// Queues are unbounded so `send` and `broadcast` never block the
/// synchronous code that calls them.
#[derive(Default)]
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<String>>,
    blobs: Arc<BlobStore>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a queue for a new connection
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let connection = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(connection, tx);
        (connection, rx)
    }

    pub fn unregister(&self, connection: ConnectionId) {
        self.connections.remove(&connection);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn blobs(&self) -> &Arc<BlobStore> {
        &self.blobs
    }
}

impl Transport for ConnectionHub {
    fn broadcast(&self, message: &str) {
        for entry in self.connections.iter() {
            // A closed receiver means the connection is going away
            let _ = entry.value().send(message.to_string());
        }
    }

    fn send(&self, connection: ConnectionId, message: &str) {
        match self.connections.get(&connection) {
            Some(tx) => {
                let _ = tx.send(message.to_string());
            }
            None => debug!(%connection, "Dropping message for closed connection"),
        }
    }

    fn serve_blob(&self, blob: Blob) -> livelens_core::Result<String> {
        let token = self.blobs.insert(blob);
        Ok(format!("/files/{}", token))
    }
}
