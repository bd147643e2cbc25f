//! Ambient render context
//!
//! Code running inside a renderer initialiser or an action can call
//! [`render`] without being handed a tree. The active tree, transport and
//! connection live in a thread-local slot. [`Context::enter`] swaps a new
//! context in and returns a guard that puts the previous one back when it is
//! dropped, so nesting and unwinding both restore the exact prior snapshot.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::ServerMessage;
use crate::transport::{Blob, BlobOptions, ConnectionId, Transport};
use crate::tree::{RenderTarget, RenderTree};
use crate::value::Value;

thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

/// Which dispatcher strategy owns the active tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Shared,
    PerConnection,
}

/// What render tree, connection and transport the current code operates under
#[derive(Clone)]
pub struct Context {
    pub strategy: Strategy,
    pub transport: Arc<dyn Transport>,
    pub tree: RenderTree,
    /// `None` while a shared renderer runs its initialiser
    pub connection: Option<ConnectionId>,
}

impl Context {
    pub fn new(
        strategy: Strategy,
        transport: Arc<dyn Transport>,
        tree: RenderTree,
        connection: Option<ConnectionId>,
    ) -> Self {
        Self {
            strategy,
            transport,
            tree,
            connection,
        }
    }

    /// Make this the active context until the guard is dropped
    pub fn enter(self) -> ContextGuard {
        let previous = CURRENT.with(|slot| slot.replace(Some(self)));
        ContextGuard {
            previous: Some(previous),
            _not_send: PhantomData,
        }
    }

    /// Run `f` with this context active
    pub fn with<F, R>(self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = self.enter();
        f()
    }

    /// The active context on this thread, if any
    pub fn current() -> Option<Context> {
        CURRENT.with(|slot| slot.borrow().clone())
    }

    pub fn is_active() -> bool {
        CURRENT.with(|slot| slot.borrow().is_some())
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.strategy == other.strategy
            && Arc::ptr_eq(&self.transport, &other.transport)
            && self.tree.ptr_eq(&other.tree)
            && self.connection == other.connection
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("strategy", &self.strategy)
            .field("tree", &self.tree)
            .field("connection", &self.connection)
            .finish()
    }
}

/// Restores the previously active context on drop
#[must_use = "the context is restored as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: Option<Option<Context>>,
    // Restoring must happen on the thread that entered
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            // Dropping the replaced context outside the borrow keeps tree teardown re-entrant
            let replaced = CURRENT.try_with(|slot| slot.replace(previous));
            drop(replaced);
        }
    }
}

/// Attach a value to the active render tree
///
/// # Panics
///
/// Panics when no render context is active. Rendering outside a renderer is a
/// wiring bug; use [`try_render`] to handle it instead.
pub fn render(value: impl Into<Value>) -> RenderTarget {
    match try_render(value) {
        Ok(target) => target,
        Err(e) => panic!("{}", e),
    }
}

/// Attach a value to the active render tree, failing if there is none
pub fn try_render(value: impl Into<Value>) -> Result<RenderTarget> {
    let context = Context::current().ok_or(Error::NoActiveContext)?;
    Ok(context.tree.attach(value))
}

/// Offer a file to the active viewer with default blob options
pub fn download<F>(name: impl Into<String>, mime_type: impl Into<String>, producer: F) -> Result<String>
where
    F: Fn() -> Vec<u8> + Send + Sync + 'static,
{
    download_with(name, mime_type, BlobOptions::default(), producer)
}

/// Offer a file to the active viewer
///
/// The transport serves the bytes out of band; the viewer only receives a
/// download notice with the URL. Without a connection (shared initialiser)
/// the notice is broadcast.
pub fn download_with<F>(
    name: impl Into<String>,
    mime_type: impl Into<String>,
    options: BlobOptions,
    producer: F,
) -> Result<String>
where
    F: Fn() -> Vec<u8> + Send + Sync + 'static,
{
    let context = Context::current().ok_or(Error::NoActiveContext)?;
    let name = name.into();
    let url = context
        .transport
        .serve_blob(Blob::new(name.clone(), mime_type, options, producer))?;

    let notice = serde_json::to_string(&ServerMessage::Download {
        url: url.clone(),
        name,
    })?;
    match context.connection {
        Some(connection) => context.transport.send(connection, &notice),
        None => context.transport.broadcast(&notice),
    }
    Ok(url)
}
