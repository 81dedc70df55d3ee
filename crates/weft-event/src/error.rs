//! Error types for the wire layer.

use thiserror::Error;

/// Errors produced while parsing event URLs or encoding/decoding payloads.
#[derive(Debug, Error)]
pub enum EventError {
    /// The event URL is not a valid URL at all.
    #[error("invalid event url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The URL path has no internal slash, so there is no entity/event split.
    #[error("event url must contain an entity and an event type")]
    MissingEventType,

    /// The final path segment is not `request`, `executed`, or `data`.
    #[error("event url contains unrecognized event type: {0:?}")]
    UnknownEventType(String),

    /// An encode was attempted with a value whose dynamic type does not
    /// match the type captured at registration.
    #[error("payload codec expected a value of type {expected}")]
    TypeMismatch {
        /// Type name the codec was registered with.
        expected: &'static str,
    },

    /// JSON (de)serialization of the envelope failed.
    #[error("payload codec failed: {0}")]
    Json(#[from] serde_json::Error),
}
