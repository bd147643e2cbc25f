//! Shared-state strategy: one tree for every viewer

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{execute_callback, new_context, rebuild, report, touched_tree, Renderer};
use crate::context::{Context, ContextGuard, Strategy};
use crate::registry::CallbackRegistry;
use crate::serializer::Serializer;
use crate::transport::{ConnectionId, Transport};
use crate::tree::RenderTree;
use crate::value::action::panic_message;

struct SharedCore {
    transport: Arc<dyn Transport>,
    serializer: Arc<Serializer>,
    // Covers clear + serialize + broadcast, and every lookup
    registry: Mutex<CallbackRegistry>,
}

impl SharedCore {
    fn refresh(&self, tree: &RenderTree) {
        let mut registry = self.registry.lock();
        rebuild(&self.serializer, tree, &mut registry, |json| self.transport.broadcast(json));
    }
}

/// One render tree and one registry for the whole process
///
/// Every change is broadcast to every connected viewer, so all viewers
/// converge on the same document. Lookups and refreshes share one lock;
/// actions run outside it.
pub struct SharedStateRenderer {
    core: Arc<SharedCore>,
    tree: RenderTree,
}

impl SharedStateRenderer {
    /// Build the shared tree and populate it with `initialise`
    ///
    /// The initialiser runs under a context with no connection; a panic in
    /// it is logged and leaves whatever was attached before the panic.
    pub fn new<F>(transport: Arc<dyn Transport>, initialise: F) -> Self
    where
        F: FnOnce(),
    {
        Self::with_serializer(transport, Serializer::new(), initialise)
    }

    /// Like [`new`](Self::new) with custom serializers registered up front
    pub fn with_serializer<F>(transport: Arc<dyn Transport>, serializer: Serializer, initialise: F) -> Self
    where
        F: FnOnce(),
    {
        let core = Arc::new(SharedCore {
            transport,
            serializer: Arc::new(serializer),
            registry: Mutex::new(CallbackRegistry::new()),
        });
        let refresh_core = core.clone();
        let tree = RenderTree::new(move |tree| refresh_core.refresh(tree));
        let renderer = Self { core, tree };

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| renderer.context(None).with(initialise))) {
            error!("Shared initialiser panicked: {}", panic_message(payload.as_ref()));
        }
        info!(nodes = renderer.tree.len(), "Shared render tree initialised");
        renderer
    }

    /// Context pointing at the shared tree
    pub fn context(&self, connection: Option<ConnectionId>) -> Context {
        new_context(Strategy::Shared, &self.core.transport, &self.tree, connection)
    }

    /// Make the shared tree the active context on the calling thread
    ///
    /// Lets code outside any initialiser or action, such as `main` after
    /// setup, call [`render`](crate::render) directly.
    pub fn enter_context(&self) -> ContextGuard {
        self.context(None).enter()
    }

    pub fn tree(&self) -> &RenderTree {
        &self.tree
    }

    /// Re-serialize and broadcast the current content
    pub fn refresh(&self) {
        self.tree.refresh();
    }

    /// Number of callbacks minted by the latest refresh
    pub fn callback_count(&self) -> usize {
        self.core.registry.lock().len()
    }
}

impl Renderer for SharedStateRenderer {
    type Session = ();

    fn strategy(&self) -> Strategy {
        Strategy::Shared
    }

    fn serializer(&self) -> &Serializer {
        &self.core.serializer
    }

    fn on_connect(&self, connection: ConnectionId) -> Self::Session {
        debug!(%connection, "Viewer joined shared tree");
        self.refresh();
    }

    fn on_message(&self, _session: &Self::Session, connection: ConnectionId, message: &str) {
        let context = self.context(Some(connection));
        match execute_callback(context, &self.core.registry, message) {
            Ok(()) => self.refresh(),
            Err(e) => {
                report(connection, message, &e);
                if touched_tree(&e) {
                    self.refresh();
                }
            }
        }
    }

    fn on_disconnect(&self, _session: Self::Session, connection: ConnectionId) {
        debug!(%connection, "Viewer left shared tree");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::render;
    use crate::document::Document;
    use crate::protocol::{InvocationRequest, ServerMessage};
    use crate::transport::MemoryTransport;
    use crate::value::Action;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn last_document(transport: &MemoryTransport, connection: ConnectionId) -> Document {
        let message = transport.last_message(connection).expect("no message");
        match serde_json::from_str::<ServerMessage>(&message).unwrap() {
            ServerMessage::Render(document) => document,
            other => panic!("Expected render, got {:?}", other),
        }
    }

    #[test]
    fn test_initialiser_populates_tree() {
        let transport = Arc::new(MemoryTransport::new());
        let renderer = SharedStateRenderer::new(transport, || {
            render("Hello World");
            render(42);
        });
        assert_eq!(renderer.tree().len(), 2);
        assert!(!Context::is_active());
    }

    #[test]
    fn test_connect_sends_current_state_to_everyone() {
        let transport = Arc::new(MemoryTransport::new());
        let renderer = SharedStateRenderer::new(transport.clone(), || {
            render("Hello World");
        });

        let a = transport.connect();
        renderer.on_connect(a);
        let b = transport.connect();
        renderer.on_connect(b);

        assert_eq!(transport.messages(a).len(), 2);
        assert_eq!(transport.messages(b).len(), 1);
        assert_eq!(transport.last_message(a), transport.last_message(b));
    }

    #[test]
    fn test_invocation_runs_under_connection_context() {
        let transport = Arc::new(MemoryTransport::new());
        let seen = Arc::new(Mutex::new(None));
        let seen_in_action = seen.clone();
        let renderer = SharedStateRenderer::new(transport.clone(), move || {
            let seen = seen_in_action.clone();
            render(Action::link("Who", move || {
                *seen.lock() = Context::current().and_then(|c| c.connection);
            }));
        });
        let a = transport.connect();
        renderer.on_connect(a);

        let id = last_document(&transport, a).find_callback("Who").unwrap().to_string();
        renderer.on_message(&(), a, &InvocationRequest::link(id).to_json().unwrap());

        assert_eq!(*seen.lock(), Some(a));
        assert!(!Context::is_active());
    }

    #[test]
    fn test_unknown_id_is_dropped_without_refresh() {
        let transport = Arc::new(MemoryTransport::new());
        let renderer = SharedStateRenderer::new(transport.clone(), || {
            render("x");
        });
        let a = transport.connect();
        renderer.on_connect(a);

        renderer.on_message(&(), a, r#"{"id":"nope","type":"link"}"#);
        renderer.on_message(&(), a, "garbage");

        assert_eq!(transport.messages(a).len(), 1);
    }

    #[test]
    fn test_faulting_action_still_refreshes() {
        let transport = Arc::new(MemoryTransport::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let renderer = SharedStateRenderer::new(transport.clone(), move || {
            let counter = counter.clone();
            render(Action::link("Boom", move || -> anyhow::Result<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("no luck")
            }));
        });
        let a = transport.connect();
        renderer.on_connect(a);

        let id = last_document(&transport, a).find_callback("Boom").unwrap().to_string();
        renderer.on_message(&(), a, &InvocationRequest::link(id).to_json().unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.messages(a).len(), 2);
    }

    #[test]
    fn test_panicking_initialiser_is_contained() {
        let transport = Arc::new(MemoryTransport::new());
        let renderer = SharedStateRenderer::new(transport, || {
            render("before");
            panic!("initialiser blew up");
        });
        assert_eq!(renderer.tree().len(), 1);
        assert!(!Context::is_active());
    }

    #[test]
    fn test_enter_context_allows_rendering_from_outside() {
        let transport = Arc::new(MemoryTransport::new());
        let renderer = SharedStateRenderer::new(transport, || {});
        {
            let _guard = renderer.enter_context();
            render("late");
        }
        assert_eq!(renderer.tree().len(), 1);
        assert!(!Context::is_active());
    }
}
