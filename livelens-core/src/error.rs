//! Error types for livelens

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invocation kind mismatch for callback {id}: expected {expected}, got {got}")]
    KindMismatch {
        id: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("Unknown callback identifier: {0}")]
    UnknownIdentifier(String),

    #[error("Argument {index} could not be read as {expected}: {reason}")]
    ArgumentDeserialization {
        index: usize,
        expected: String,
        reason: String,
    },

    #[error("Callback fault: {0}")]
    CallbackFault(String),

    #[error(
        "No render context is active. Create a SharedStateRenderer or PerConnectionRenderer \
         and render from inside its initialiser or an action"
    )]
    NoActiveContext,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Taxonomy label attached to dispatch diagnostics
    pub fn category(&self) -> &'static str {
        match self {
            Error::Protocol(_) | Error::KindMismatch { .. } => "protocol",
            Error::UnknownIdentifier(_) => "unknown_identifier",
            Error::ArgumentDeserialization { .. } => "argument",
            Error::CallbackFault(_) => "callback_fault",
            Error::NoActiveContext => "misconfiguration",
            Error::Serialization(_) => "serialization",
            Error::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
