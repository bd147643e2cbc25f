//! Time-limited store for downloadable blobs

use dashmap::DashMap;
use livelens_core::Blob;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimError {
    #[error("No blob with token {0}")]
    NotFound(String),

    #[error("Blob {0} has expired")]
    Expired(String),
}

struct Entry {
    blob: Blob,
    expires_at: Instant,
    remaining: Option<u32>,
}

/// Blobs keyed by an unguessable token
///
/// An entry disappears once its ttl has run out or its download allowance is
/// used up, whichever comes first.
#[derive(Default)]
pub struct BlobStore {
    entries: DashMap<String, Entry>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a blob and return its token
    pub fn insert(&self, blob: Blob) -> String {
        self.insert_at(blob, Instant::now())
    }

    fn insert_at(&self, blob: Blob, now: Instant) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let entry = Entry {
            expires_at: now + blob.options.ttl,
            remaining: blob.options.max_downloads,
            blob,
        };
        debug!(%token, name = %entry.blob.name, "Serving blob");
        self.entries.insert(token.clone(), entry);
        token
    }

    /// Take one download of the blob behind `token`
    pub fn claim(&self, token: &str) -> Result<Blob, ClaimError> {
        self.claim_at(token, Instant::now())
    }

    fn claim_at(&self, token: &str, now: Instant) -> Result<Blob, ClaimError> {
        let mut entry = self
            .entries
            .get_mut(token)
            .ok_or_else(|| ClaimError::NotFound(token.to_string()))?;

        if now >= entry.expires_at {
            drop(entry);
            self.entries.remove(token);
            return Err(ClaimError::Expired(token.to_string()));
        }

        let blob = entry.blob.clone();
        let exhausted = match entry.remaining.as_mut() {
            Some(remaining) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            None => false,
        };
        drop(entry);

        if exhausted {
            self.entries.remove(token);
        }
        Ok(blob)
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge(&self) -> usize {
        self.purge_at(Instant::now())
    }

    fn purge_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time left before the blob behind `token` expires
    pub fn time_left(&self, token: &str) -> Option<Duration> {
        self.entries
            .get(token)
            .map(|entry| entry.expires_at.saturating_duration_since(Instant::now()))
    }
}
