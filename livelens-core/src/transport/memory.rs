//! In-process transport that records every outbound message

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;
use uuid::Uuid;

use super::{Blob, ConnectionId, Transport};
use crate::error::Result;

/// Transport with one in-memory outbox per connection
///
/// Useful for embedding a renderer without a network and for tests.
#[derive(Default)]
pub struct MemoryTransport {
    outboxes: Mutex<FxHashMap<ConnectionId, Vec<String>>>,
    blobs: Mutex<FxHashMap<String, Blob>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection with an empty outbox
    pub fn connect(&self) -> ConnectionId {
        let connection = ConnectionId::new();
        self.outboxes.lock().insert(connection, Vec::new());
        connection
    }

    pub fn disconnect(&self, connection: ConnectionId) {
        self.outboxes.lock().remove(&connection);
    }

    pub fn connection_count(&self) -> usize {
        self.outboxes.lock().len()
    }

    /// Everything sent to `connection` so far
    pub fn messages(&self, connection: ConnectionId) -> Vec<String> {
        self.outboxes
            .lock()
            .get(&connection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_message(&self, connection: ConnectionId) -> Option<String> {
        self.outboxes
            .lock()
            .get(&connection)
            .and_then(|outbox| outbox.last().cloned())
    }

    /// Drain the outbox of `connection`
    pub fn take_messages(&self, connection: ConnectionId) -> Vec<String> {
        self.outboxes
            .lock()
            .get_mut(&connection)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Look up a blob by the URL returned from `serve_blob`
    pub fn blob(&self, url: &str) -> Option<Blob> {
        self.blobs.lock().get(url).cloned()
    }
}

impl Transport for MemoryTransport {
    fn broadcast(&self, message: &str) {
        for outbox in self.outboxes.lock().values_mut() {
            outbox.push(message.to_string());
        }
    }

    fn send(&self, connection: ConnectionId, message: &str) {
        match self.outboxes.lock().get_mut(&connection) {
            Some(outbox) => outbox.push(message.to_string()),
            None => debug!("Dropping message for closed connection {}", connection),
        }
    }

    fn serve_blob(&self, blob: Blob) -> Result<String> {
        let url = format!("/files/{}", Uuid::new_v4().simple());
        self.blobs.lock().insert(url.clone(), blob);
        Ok(url)
    }
}
