//! Node runtime for the weft event fabric.
//!
//! A [`Node`] is one endpoint of the fabric. It owns named entities and
//! speaks to the rest of the world exclusively through a hub:
//!
//! - an [`Actor`] accepts `request` events and, after performing its
//!   action, causes the node to publish a matching `executed` event;
//! - an [`Emitter`] feeds a stream of values that the node publishes as
//!   `data` events;
//! - a *hook* observes another entity's events (on any node) without
//!   owning it.
//!
//! ```text
//!                         ┌───────────────────────────────┐
//!        inbound delivery │             Node              │
//!  Hub ──────────────────►│  Subscriber ──► dispatch      │
//!      ◄──────────────────│  Publisher  ◄── broadcast     │
//!        outbound publish │                               │
//!                         │  actors / emitters / hooks    │
//!                         └───────────────────────────────┘
//! ```
//!
//! # Registration and subscriptions
//!
//! Entities can be added at any time. Before [`Node::subscribe_all`] the
//! required hub leases are deferred; afterwards, adding an actor or a
//! hook callback creates its lease immediately, before the registration
//! call returns. [`Node::unsubscribe_all`] releases every lease but keeps
//! all registrations.
//!
//! # Dispatch
//!
//! Every subscription delivery runs the same state machine: check the
//! payload content type, parse the topic into entity URL + event type,
//! resolve the codec, decode, then hand the message to the hook for that
//! slot or, for `request` events, to the owned actor. Hooks take priority
//! over actor execution on the same node. Protocol errors are logged and
//! dropped, never surfaced to the hub.
//!
//! # Type safety
//!
//! Registries store type-erased proxies; each registration captures its
//! payload type in a [`JsonCodec`]. Routing a message whose runtime type
//! does not match the registered type through a proxy is a programming
//! error and panics rather than silently dropping the bug.
//!
//! [`JsonCodec`]: weft_event::JsonCodec

mod actor;
mod emitter;
mod error;
mod hook;
mod node;
mod proxies;

pub use actor::{Actor, FuncActor};
pub use emitter::{ChannelEmitter, Emitter};
pub use error::NodeError;
pub use hook::{HookBroadcaster, HookFn};
pub use node::Node;

// Re-export the wire types every node user needs.
pub use weft_event::{EventPayload, EventType, Payload, PAYLOAD_CONTENT_TYPE};
