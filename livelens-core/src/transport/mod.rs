//! Transport abstraction
//!
//! The render core never touches sockets. It hands finished messages to a
//! [`Transport`], which is expected to queue them and return immediately, and
//! asks it to serve binary blobs out of band.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

pub mod memory;

pub use memory::MemoryTransport;

/// Opaque handle identifying one viewer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound side of a transport
///
/// Implementations must not block: messages are handed over while a
/// renderer holds its registry lock.
pub trait Transport: Send + Sync + 'static {
    /// Send a message to every open connection
    fn broadcast(&self, message: &str);

    /// Send a message to one connection; unknown connections are ignored
    fn send(&self, connection: ConnectionId, message: &str);

    /// Make a blob downloadable and return the URL viewers should fetch
    fn serve_blob(&self, blob: Blob) -> Result<String>;
}

/// Lifetime limits for a served blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobOptions {
    pub ttl: Duration,
    /// `None` allows any number of downloads until the ttl runs out
    pub max_downloads: Option<u32>,
}

impl Default for BlobOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_downloads: None,
        }
    }
}

type Producer = dyn Fn() -> Vec<u8> + Send + Sync;

/// Binary payload delivered outside the render channel
#[derive(Clone)]
pub struct Blob {
    pub name: String,
    pub mime_type: String,
    pub options: BlobOptions,
    producer: Arc<Producer>,
}

impl Blob {
    pub fn new<F>(name: impl Into<String>, mime_type: impl Into<String>, options: BlobOptions, producer: F) -> Self
    where
        F: Fn() -> Vec<u8> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            options,
            producer: Arc::new(producer),
        }
    }

    /// Generate the bytes; called once per download
    pub fn produce(&self) -> Vec<u8> {
        (self.producer)()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("options", &self.options)
            .finish()
    }
}
