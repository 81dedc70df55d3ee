//! Error types for node operations.

use thiserror::Error;
use weft_event::{EventError, EventType};
use weft_websub::WebsubError;

/// Errors returned by caller-initiated node operations.
///
/// Inbound dispatch never produces these; protocol problems on that path
/// are logged and dropped.
#[derive(Debug, Error)]
pub enum NodeError {
    /// An actor is already registered under this entity URL.
    #[error("actor already exists: {entity_url}")]
    ActorExists {
        /// The conflicting entity URL.
        entity_url: String,
    },

    /// An emitter is already registered under this entity URL.
    #[error("emitter already exists: {entity_url}")]
    EmitterExists {
        /// The conflicting entity URL.
        entity_url: String,
    },

    /// A hook callback is already registered for this entity and event
    /// type.
    #[error("hook already exists for {entity_url}/{event_type}")]
    HookExists {
        /// The hooked entity URL.
        entity_url: String,
        /// The event type slot that is already taken.
        event_type: EventType,
    },

    /// No registration on this node can encode or decode the event.
    #[error("encoder not found for event url: {event_url}")]
    EncoderNotFound {
        /// The unresolvable event URL.
        event_url: String,
    },

    /// `subscribe_all` was called while already subscribed.
    #[error("already subscribed")]
    AlreadySubscribed,

    /// `unsubscribe_all` was called while not subscribed.
    #[error("not subscribed")]
    NotSubscribed,

    /// The event URL or payload was malformed.
    #[error(transparent)]
    Event(#[from] EventError),

    /// The hub refused or could not be reached.
    #[error(transparent)]
    Websub(#[from] WebsubError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_actor_exists() {
        let err = NodeError::ActorExists {
            entity_url: "http://localhost:4044/test".into(),
        };
        assert_eq!(err.to_string(), "actor already exists: http://localhost:4044/test");
    }

    #[test]
    fn display_hook_exists() {
        let err = NodeError::HookExists {
            entity_url: "http://localhost:4044/test".into(),
            event_type: EventType::Request,
        };
        assert_eq!(
            err.to_string(),
            "hook already exists for http://localhost:4044/test/request"
        );
    }

    #[test]
    fn display_subscription_state() {
        assert_eq!(NodeError::AlreadySubscribed.to_string(), "already subscribed");
        assert_eq!(NodeError::NotSubscribed.to_string(), "not subscribed");
    }
}
