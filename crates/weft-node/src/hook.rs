//! Hooks: third-party observers of a remote entity's events.

use crate::node::Node;
use crate::proxies::narrow;
use crate::NodeError;
use std::marker::PhantomData;
use std::sync::Arc;
use weft_event::{AnyPayload, EventPayload, Payload, PayloadCodec};

/// Callback invoked with the decoded payload of a hooked event.
pub type HookFn<T> = Box<dyn Fn(EventPayload<T>) + Send + Sync>;

/// Type-erased hook callback stored in the registry.
pub(crate) type ErasedHookFn = Box<dyn Fn(&AnyPayload) + Send + Sync>;

/// One `(entity URL, event type)` hook slot.
///
/// The codec is always present so the node can decode (and a broadcaster
/// can encode) messages for the external entity; the callback is only
/// present when the registrant asked to observe this event type.
pub(crate) struct EventHook {
    pub(crate) codec: Arc<dyn PayloadCodec>,
    pub(crate) callback: Option<ErasedHookFn>,
}

/// Wraps a typed callback so the registry can store it erased.
pub(crate) fn erase_hook_fn<T: Payload>(callback: HookFn<T>) -> ErasedHookFn {
    Box::new(move |msg: &AnyPayload| callback(narrow::<T>(msg)))
}

/// Publishes events toward a hooked entity.
///
/// Returned by hook registration: an actor hook yields a broadcaster for
/// the entity's `request` topic, an emitter hook for its `data` topic.
pub struct HookBroadcaster<T> {
    node: Arc<Node>,
    event_url: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for HookBroadcaster<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookBroadcaster")
            .field("node", &self.node)
            .field("event_url", &self.event_url)
            .finish_non_exhaustive()
    }
}

impl<T: Payload> HookBroadcaster<T> {
    pub(crate) fn new(node: Arc<Node>, event_url: String) -> Self {
        Self {
            node,
            event_url,
            _payload: PhantomData,
        }
    }

    /// The topic this broadcaster publishes on.
    #[must_use]
    pub fn event_url(&self) -> &str {
        &self.event_url
    }

    /// Encodes `data` with the hook's codec and publishes it.
    ///
    /// # Errors
    ///
    /// Fails when the codec cannot encode the value or the hub refuses
    /// the publish.
    pub async fn broadcast(&self, data: &T) -> Result<(), NodeError> {
        self.node.broadcast(&self.event_url, data).await
    }
}
