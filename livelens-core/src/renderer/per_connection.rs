//! Per-connection strategy: an isolated tree for each viewer

use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

use super::{execute_callback, new_context, rebuild, report, touched_tree, Renderer};
use crate::context::{Context, Strategy};
use crate::registry::CallbackRegistry;
use crate::serializer::Serializer;
use crate::transport::{ConnectionId, Transport};
use crate::tree::RenderTree;
use crate::value::action::panic_message;

type Initialiser = dyn Fn() + Send + Sync;

/// Tree and registry owned by one connection
pub struct ConnectionState {
    connection: ConnectionId,
    tree: RenderTree,
    registry: Arc<Mutex<CallbackRegistry>>,
}

impl ConnectionState {
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn tree(&self) -> &RenderTree {
        &self.tree
    }

    /// Number of callbacks minted by the latest refresh of this connection
    pub fn callback_count(&self) -> usize {
        self.registry.lock().len()
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionState")
            .field("connection", &self.connection)
            .field("tree", &self.tree)
            .finish()
    }
}

/// Builds a fresh tree for every connection by running the initialiser
///
/// Connections never see each other's trees, and an identifier minted for
/// one connection resolves against that connection's registry only.
pub struct PerConnectionRenderer {
    transport: Arc<dyn Transport>,
    serializer: Arc<Serializer>,
    initialise: Arc<Initialiser>,
}

impl PerConnectionRenderer {
    pub fn new<F>(transport: Arc<dyn Transport>, initialise: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_serializer(transport, Serializer::new(), initialise)
    }

    pub fn with_serializer<F>(transport: Arc<dyn Transport>, serializer: Serializer, initialise: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            transport,
            serializer: Arc::new(serializer),
            initialise: Arc::new(initialise),
        }
    }

    fn context(&self, state: &ConnectionState) -> Context {
        new_context(Strategy::PerConnection, &self.transport, &state.tree, Some(state.connection))
    }
}

impl Renderer for PerConnectionRenderer {
    type Session = Arc<ConnectionState>;

    fn strategy(&self) -> Strategy {
        Strategy::PerConnection
    }

    fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    fn on_connect(&self, connection: ConnectionId) -> Self::Session {
        let registry = Arc::new(Mutex::new(CallbackRegistry::new()));
        let tree = {
            let registry = registry.clone();
            let transport = self.transport.clone();
            let serializer = self.serializer.clone();
            RenderTree::new(move |tree| {
                let mut registry = registry.lock();
                rebuild(&serializer, tree, &mut registry, |json| transport.send(connection, json));
            })
        };
        let state = Arc::new(ConnectionState {
            connection,
            tree,
            registry,
        });

        let initialise = self.initialise.clone();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.context(&state).with(|| initialise()))) {
            error!(%connection, "Connection initialiser panicked: {}", panic_message(payload.as_ref()));
        }
        // An initialiser that attaches nothing still gets an (empty) document
        if state.tree.is_empty() {
            state.tree.refresh();
        }
        debug!(%connection, nodes = state.tree.len(), "Connection tree initialised");
        state
    }

    fn on_message(&self, session: &Self::Session, connection: ConnectionId, message: &str) {
        if session.connection != connection {
            error!(
                %connection,
                owner = %session.connection,
                "Message delivered with another connection's session"
            );
            return;
        }
        match execute_callback(self.context(session), &session.registry, message) {
            Ok(()) => session.tree.refresh(),
            Err(e) => {
                report(connection, message, &e);
                if touched_tree(&e) {
                    session.tree.refresh();
                }
            }
        }
    }

    fn on_disconnect(&self, session: Self::Session, connection: ConnectionId) {
        debug!(%connection, nodes = session.tree.len(), "Dropping connection tree");
    }
}
