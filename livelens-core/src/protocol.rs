//! Wire messages exchanged with viewers
//!
//! Viewers send `{"id": ..., "type": "link" | "form", "args": [...]}`.
//! The server pushes `render` documents and `download` notices.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::value::InvocationKind;

/// Invocation request sent by a viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: InvocationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<JsonValue>>,
}

impl InvocationRequest {
    pub fn link(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: InvocationKind::Link,
            args: None,
        }
    }

    pub fn form(id: impl Into<String>, args: Vec<JsonValue>) -> Self {
        Self {
            id: id.into(),
            kind: InvocationKind::Form,
            args: Some(args),
        }
    }

    /// Parse an inbound text frame
    pub fn parse(message: &str) -> Result<Self> {
        serde_json::from_str(message).map_err(|e| Error::Protocol(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages pushed from the server to viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Render(Document),
    Download { url: String, name: String },
}
