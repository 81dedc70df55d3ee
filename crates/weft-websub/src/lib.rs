//! WebSub-style hub, publisher, and subscriber.
//!
//! This crate is the protocol layer of the weft workspace. A [`Hub`]
//! relays publications to subscribers; a [`Publisher`] pushes content to a
//! hub; a [`Subscriber`] manages leases and receives deliveries on a
//! callback URL.
//!
//! ```text
//! ┌───────────┐  publish   ┌───────────┐  deliver   ┌────────────┐
//! │ Publisher │ ─────────► │    Hub    │ ─────────► │ Subscriber │
//! └───────────┘            │ (sniffers)│            └────────────┘
//!                          └───────────┘
//!                                ▲
//!                subscribe + verification dance
//! ```
//!
//! # Protocol notes
//!
//! - Subscription requests are form-encoded (`hub.mode`, `hub.topic`,
//!   `hub.callback`, `hub.secret`, `hub.lease_seconds`). The hub verifies
//!   intent *synchronously*: once `subscribe().await` returns `Ok`, the
//!   lease is active.
//! - Publishes carry the body verbatim as content (`hub.mode=publish` in
//!   the query string); the hub accepts any topic, including topics it
//!   does not host.
//! - Deliveries are signed with `X-Hub-Signature: sha256=<hex hmac>` when
//!   the subscription carries a secret.
//! - Distribution is per-topic FIFO: each topic gets its own worker task
//!   with an unbounded queue. No ordering holds across topics.
//!
//! # Sniffers
//!
//! [`Hub::add_sniffer`] attaches a [`PublishObserver`] to a topic (the
//! empty topic matches everything). Observers are awaited before
//! distribution, so an observer sees every publish that its topic matches,
//! in arrival order.

mod error;
mod hub;
mod publisher;
mod signature;
mod subscriber;

pub use error::WebsubError;
pub use hub::{Hub, PublishObserver};
pub use publisher::Publisher;
pub use subscriber::{DeliveryHandler, Subscriber, Subscription};
