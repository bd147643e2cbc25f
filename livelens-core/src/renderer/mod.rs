//! Dispatcher strategies
//!
//! A [`Renderer`] plugs into the transport's connection lifecycle. Two
//! strategies are provided:
//!
//! - [`SharedStateRenderer`]: one tree and one registry for the whole process,
//!   every refresh is broadcast to every viewer.
//! - [`PerConnectionRenderer`]: a tree and registry per connection, refreshes
//!   go only to that connection.

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::context::{Context, Strategy};
use crate::error::{Error, Result};
use crate::protocol::InvocationRequest;
use crate::registry::CallbackRegistry;
use crate::serializer::Serializer;
use crate::transport::{ConnectionId, Transport};
use crate::tree::RenderTree;

pub mod per_connection;
pub mod shared;

pub use per_connection::{ConnectionState, PerConnectionRenderer};
pub use shared::SharedStateRenderer;

/// Connection lifecycle hooks a transport drives
pub trait Renderer: Send + Sync + 'static {
    /// State the transport keeps per connection and hands back on every message
    type Session: Send + Sync + 'static;

    fn strategy(&self) -> Strategy;

    /// Serializer used for every refresh; register custom hooks here
    fn serializer(&self) -> &Serializer;

    fn on_connect(&self, connection: ConnectionId) -> Self::Session;

    /// Handle one inbound text frame. Never fails: bad messages are logged and dropped.
    fn on_message(&self, session: &Self::Session, connection: ConnectionId, message: &str);

    fn on_disconnect(&self, _session: Self::Session, _connection: ConnectionId) {}
}

/// Decode, resolve and run one invocation under `context`
///
/// The registry lock is only held for the lookup; the action runs unlocked
/// so it can update render targets, which re-enter the registry on refresh.
pub(crate) fn execute_callback(
    context: Context,
    registry: &Mutex<CallbackRegistry>,
    message: &str,
) -> Result<()> {
    let request = InvocationRequest::parse(message)?;
    let action = registry.lock().lookup(&request.id)?;
    let call = action.prepare(&request.id, request.kind, request.args.as_deref())?;

    let _guard = context.enter();
    call.call()
}

/// Whether the tree may have changed despite the error
pub(crate) fn touched_tree(error: &Error) -> bool {
    matches!(error, Error::CallbackFault(_))
}

pub(crate) fn report(connection: ConnectionId, message: &str, error: &Error) {
    match error {
        Error::CallbackFault(_) => error!(
            %connection,
            category = error.category(),
            "Callback failed: {}",
            error
        ),
        _ => warn!(
            %connection,
            category = error.category(),
            payload = message,
            "Dropping message: {}",
            error
        ),
    }
}

/// Clear, re-serialize and hand the document to `deliver`
pub(crate) fn rebuild<F>(
    serializer: &Serializer,
    tree: &RenderTree,
    registry: &mut CallbackRegistry,
    deliver: F,
) where
    F: FnOnce(&str),
{
    registry.clear();
    let document = serializer.serialize(tree, registry);
    match document.encode() {
        Ok(json) => {
            tracing::debug!(
                pass = registry.pass(),
                callbacks = registry.len(),
                bytes = json.len(),
                "Refreshing render tree"
            );
            deliver(&json);
        }
        Err(e) => error!("Failed to encode render document: {}", e),
    }
}

pub(crate) fn new_context(
    strategy: Strategy,
    transport: &std::sync::Arc<dyn Transport>,
    tree: &RenderTree,
    connection: Option<ConnectionId>,
) -> Context {
    Context::new(strategy, transport.clone(), tree.clone(), connection)
}
