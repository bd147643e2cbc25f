//! Per-tree callback registry

use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::value::Action;

/// Maps wire identifiers to the actions minted during one serialization pass
///
/// Identifiers are fresh UUIDs, so an id from an earlier pass never matches
/// anything after [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct CallbackRegistry {
    callbacks: FxHashMap<String, Action>,
    pass: u64,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every identifier and start a new pass
    pub fn clear(&mut self) {
        self.callbacks.clear();
        self.pass += 1;
    }

    /// Mint an identifier for `action`
    pub fn register(&mut self, action: Action) -> String {
        let id = Uuid::new_v4().simple().to_string();
        self.callbacks.insert(id.clone(), action);
        id
    }

    pub fn lookup(&self, id: &str) -> Result<Action> {
        self.callbacks
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownIdentifier(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.callbacks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Number of passes started so far
    pub fn pass(&self) -> u64 {
        self.pass
    }
}
