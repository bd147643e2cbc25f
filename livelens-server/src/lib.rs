//! WebSocket transport for LiveLens
//!
//! Wires a [`livelens_core::Renderer`] to browsers:
//! - `GET /ws` carries render documents out and invocations in
//! - `GET /files/:token` serves blobs offered with `download`
//! - an optional static directory serves everything else

pub mod blob;
pub mod config;
pub mod demo;
pub mod hub;
pub mod server;

pub use blob::BlobStore;
pub use config::{load_config, ServerConfig, StrategyKind};
pub use hub::ConnectionHub;
pub use server::{BoundServer, LiveServer};
