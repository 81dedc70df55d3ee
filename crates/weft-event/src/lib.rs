//! Wire types for the weft event fabric.
//!
//! This crate is the SDK layer every other weft crate builds on:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  weft-event  : EventType, event URLs, EventPayload, codecs  │ ◄── HERE
//! ├─────────────────────────────────────────────────────────────┤
//! │  weft-websub : Hub, Publisher, Subscriber                   │
//! │  weft-node   : Actor/Emitter registries, dispatch           │
//! │  weft-manager: rule engine                                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Event addressing
//!
//! Every message on the wire is published on a topic of the form
//! `{entity URL}/{event type}`, where the entity URL names an actor or
//! emitter and the event type is one of `request`, `executed`, or `data`:
//!
//! ```text
//! http://localhost:4044/door/request
//! └────────┬───────────┘ └─┬─┘ └──┬──┘
//!       node baseURL     entity  event type
//! ```
//!
//! [`parse_event_url`] splits a topic back into its entity URL and
//! [`EventType`]; [`compose_event_url`] is its inverse.
//!
//! # Payload envelope
//!
//! [`EventPayload`] is the JSON envelope carried by every publish,
//! serialized with the fixed content type [`PAYLOAD_CONTENT_TYPE`]:
//!
//! ```json
//! { "data": {...}, "dateSent": "2024-…", "eventType": "request", "sender": "http://…" }
//! ```
//!
//! # Type erasure
//!
//! A node stores heterogeneously-typed actors and emitters in uniform
//! registries. [`JsonCodec`] captures the payload type `T` at registration
//! and exposes it behind the object-safe [`PayloadCodec`] trait: the encode
//! path checks the dynamic type of the value it is handed, the decode path
//! deserializes into `T` and widens to [`AnyPayload`].
//!
//! # Example
//!
//! ```
//! use weft_event::{parse_event_url, EventType};
//!
//! let (entity, kind) = parse_event_url("http://localhost:4044/door/request").unwrap();
//! assert_eq!(entity, "http://localhost:4044/door");
//! assert_eq!(kind, EventType::Request);
//! ```

mod codec;
mod error;
mod event_type;
mod payload;
mod url;

pub use codec::{JsonCodec, Payload, PayloadCodec};
pub use error::EventError;
pub use event_type::EventType;
pub use payload::{
    decode_message, encode_message, AnyPayload, EventPayload, PAYLOAD_CONTENT_TYPE,
};
pub use url::{compose_event_url, parse_event_url};
