//! Error types for the recoverable failure modes of the crate.
//!
//! The reactive engine itself has no recoverable errors: reaction bodies are
//! plain closures and a panicking reaction unwinds into whatever triggered it.
//! Errors here come from the wire format, patch application and
//! configuration loading.

/// Errors produced by the serializer, patch application and configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("value is not an object or array")]
    NotContainer,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MessagePack encode failed: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decode failed: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    #[error("patch path {path:?} does not resolve")]
    PathNotFound { path: Vec<String> },

    #[error("invalid revision marker: {0}")]
    InvalidRevision(serde_json::Value),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
