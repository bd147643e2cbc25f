//! Core of LiveLens: live, mutable views of in-process values
//!
//! This crate provides the transport-neutral pieces:
//! - Render trees and the targets that update them
//! - The ambient render context behind [`render`]
//! - Serialization of trees into documents, minting callback identifiers
//! - Invocation dispatch under the shared and per-connection strategies
//!
//! ```
//! use std::sync::Arc;
//! use livelens_core::{render, Action, MemoryTransport, Renderer, SharedStateRenderer};
//!
//! let transport = Arc::new(MemoryTransport::new());
//! let renderer = SharedStateRenderer::new(transport.clone(), || {
//!     let greeting = render("Hello World");
//!     render(Action::link("Wave", move || greeting.set("Hi!")));
//! });
//!
//! let viewer = transport.connect();
//! renderer.on_connect(viewer);
//! assert_eq!(transport.messages(viewer).len(), 1);
//! ```

pub mod context;
pub mod document;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod renderer;
pub mod serializer;
pub mod transport;
pub mod tree;
pub mod value;

pub use context::{download, download_with, render, try_render, Context, ContextGuard, Strategy};
pub use document::{DocNode, Document};
pub use error::{Error, Result};
pub use protocol::{InvocationRequest, ServerMessage};
pub use registry::CallbackRegistry;
pub use renderer::{ConnectionState, PerConnectionRenderer, Renderer, SharedStateRenderer};
pub use serializer::Serializer;
pub use transport::{Blob, BlobOptions, ConnectionId, MemoryTransport, Transport};
pub use tree::{NodeId, RenderTarget, RenderTree};
pub use value::{Action, Enumerated, FormArgs, InvocationKind, Param, ParamType, Record, Value};
