//! HTTP and WebSocket server driving a renderer

use anyhow::Context as _;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use livelens_core::Renderer;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::blob::{BlobStore, ClaimError};
use crate::config::ServerConfig;
use crate::hub::ConnectionHub;

/// Shared server state
struct AppState<R> {
    hub: Arc<ConnectionHub>,
    renderer: Arc<R>,
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            renderer: self.renderer.clone(),
        }
    }
}

/// Serves a renderer over WebSocket
///
/// The hub passed in must be the transport the renderer was built with.
pub struct LiveServer<R: Renderer> {
    config: ServerConfig,
    state: AppState<R>,
}

impl<R: Renderer> LiveServer<R> {
    pub fn new(config: ServerConfig, hub: Arc<ConnectionHub>, renderer: Arc<R>) -> Self {
        Self {
            config,
            state: AppState { hub, renderer },
        }
    }

    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/ws", get(websocket_handler::<R>))
            .route("/files/:token", get(file_handler::<R>));

        let router = match &self.config.static_dir {
            Some(dir) => router.fallback_service(ServeDir::new(dir)),
            None => router,
        };

        router
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the listener without serving yet
    pub async fn bind(self) -> anyhow::Result<BoundServer> {
        let address = self.config.address();
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind {}", address))?;
        let local_addr = listener.local_addr()?;

        Ok(BoundServer {
            router: self.router(),
            listener,
            local_addr,
            blobs: self.state.hub.blobs().clone(),
            purge_interval: self.config.purge_interval(),
        })
    }

    /// Start the server
    pub async fn run(self) -> anyhow::Result<()> {
        self.bind().await?.run().await
    }
}

/// A server whose listener is bound
pub struct BoundServer {
    router: Router,
    listener: TcpListener,
    local_addr: SocketAddr,
    blobs: Arc<BlobStore>,
    purge_interval: Duration,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let purge = tokio::spawn(purge_blobs(self.blobs, self.purge_interval));

        info!("LiveLens listening on http://{}", self.local_addr);
        let served = axum::serve(self.listener, self.router).await;
        purge.abort();
        served?;
        Ok(())
    }

    /// Serve on a background task
    pub fn spawn(self) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(self.run())
    }
}

async fn purge_blobs(blobs: Arc<BlobStore>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let removed = blobs.purge();
        if removed > 0 {
            debug!(removed, "Purged expired blobs");
        }
    }
}

/// WebSocket handler
async fn websocket_handler<R: Renderer>(ws: WebSocketUpgrade, State(state): State<AppState<R>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
///
/// Frames are dispatched one at a time on the blocking pool, so a connection
/// sees its invocations complete in order and slow callbacks never stall the
/// runtime.
async fn handle_socket<R: Renderer>(socket: WebSocket, state: AppState<R>) {
    let (connection, mut outbound) = state.hub.register();
    let (mut sender, mut receiver) = socket.split();
    info!(%connection, "Viewer connected");

    // Task to send messages to client
    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let renderer = state.renderer.clone();
    let session = match tokio::task::spawn_blocking(move || renderer.on_connect(connection)).await {
        Ok(session) => Arc::new(session),
        Err(e) => {
            error!(%connection, "Connection setup failed: {}", e);
            state.hub.unregister(connection);
            let _ = writer.await;
            return;
        }
    };

    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(%connection, "WebSocket error: {}", e);
                break;
            }
        };

        let renderer = state.renderer.clone();
        let session = session.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || renderer.on_message(&session, connection, &text)).await {
            error!(%connection, "Dispatch task failed: {}", e);
        }
    }

    state.hub.unregister(connection);
    match Arc::try_unwrap(session) {
        Ok(session) => state.renderer.on_disconnect(session, connection),
        Err(_) => warn!(%connection, "Session still referenced after disconnect"),
    }
    let _ = writer.await;
    info!(%connection, "Viewer disconnected");
}

/// Blob download handler
async fn file_handler<R: Renderer>(Path(token): Path<String>, State(state): State<AppState<R>>) -> Response {
    let blob = match state.hub.blobs().claim(&token) {
        Ok(blob) => blob,
        Err(e @ ClaimError::NotFound(_)) => return (StatusCode::NOT_FOUND, e.to_string()).into_response(),
        Err(e @ ClaimError::Expired(_)) => return (StatusCode::GONE, e.to_string()).into_response(),
    };

    let name = blob.name.clone();
    let mime_type = blob.mime_type.clone();
    match tokio::task::spawn_blocking(move || blob.produce()).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, mime_type),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", name.replace('"', "")),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            error!(%token, "Blob producer failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
