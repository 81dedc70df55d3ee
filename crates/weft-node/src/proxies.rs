//! Type-erased projections stored in the node's registries.
//!
//! The registries hold entities of many payload types in uniform maps, so
//! each registration is projected to closures over the widened
//! [`AnyPayload`]. The projections re-narrow before invoking typed user
//! code; a narrowing failure means a registration-time type and a
//! runtime value disagree, which is a programming error and panics.

use crate::Actor;
use std::sync::Arc;
use weft_event::{AnyPayload, EventPayload, JsonCodec, Payload, PayloadCodec};

/// Type-erased predicate over a widened payload.
pub(crate) type ErasedIndicatorFn = Box<dyn Fn(&AnyPayload) -> bool + Send + Sync>;

/// An owned actor, projected for registry storage.
pub(crate) struct ActorProxy {
    pub(crate) codec: Arc<dyn PayloadCodec>,
    pub(crate) should_act: ErasedIndicatorFn,
    pub(crate) act: ErasedIndicatorFn,
}

impl ActorProxy {
    pub(crate) fn new<A: Actor>(actor: A) -> Self {
        let actor = Arc::new(actor);
        let for_should_act = Arc::clone(&actor);

        Self {
            codec: Arc::new(JsonCodec::<A::Msg>::new()),
            should_act: Box::new(move |msg| for_should_act.should_act(&narrow::<A::Msg>(msg))),
            act: Box::new(move |msg| actor.act(&narrow::<A::Msg>(msg))),
        }
    }
}

/// An owned emitter, projected for registry storage.
///
/// Publishing is driven by the forwarder task spawned at registration;
/// the registry entry only has to resolve the codec.
pub(crate) struct EmitterProxy {
    pub(crate) codec: Arc<dyn PayloadCodec>,
}

impl EmitterProxy {
    pub(crate) fn new<T: Payload>() -> Self {
        Self {
            codec: Arc::new(JsonCodec::<T>::new()),
        }
    }
}

/// Re-narrows a widened payload to `T`.
///
/// Panics on mismatch: the codec that decoded the message was registered
/// with the same `T` as the callback, so a different runtime type cannot
/// come from the wire, only from a bug in registration plumbing.
pub(crate) fn narrow<T: Payload>(msg: &AnyPayload) -> EventPayload<T> {
    msg.downcast::<T>().unwrap_or_else(|| {
        panic!(
            "payload proxy called with incorrect type: expected {}",
            std::any::type_name::<T>()
        )
    })
}
