//! The actor abstraction.

use weft_event::{EventPayload, Payload};

/// An entity that performs an action on behalf of its node when other
/// services request it.
///
/// To trigger an actor programmatically, publish a `request` event
/// through a node rather than calling [`Actor::act`] directly, so the
/// proper events are fired.
pub trait Actor: Send + Sync + 'static {
    /// Payload type this actor's events carry.
    type Msg: Payload;

    /// A URL-safe name for this actor; may contain slashes.
    fn name(&self) -> &str;

    /// Whether [`Actor::act`] should be called for this message.
    fn should_act(&self, msg: &EventPayload<Self::Msg>) -> bool;

    /// Performs the action; returns whether it completed successfully.
    ///
    /// A `true` return makes the owning node publish an `executed` event
    /// carrying the same data.
    fn act(&self, msg: &EventPayload<Self::Msg>) -> bool;
}

/// An [`Actor`] built from two closures.
pub struct FuncActor<T> {
    name: String,
    should_act: Box<dyn Fn(&EventPayload<T>) -> bool + Send + Sync>,
    act: Box<dyn Fn(&EventPayload<T>) -> bool + Send + Sync>,
}

impl<T: Payload> FuncActor<T> {
    /// Creates an actor that calls the passed closures for its methods.
    pub fn new(
        name: impl Into<String>,
        should_act: impl Fn(&EventPayload<T>) -> bool + Send + Sync + 'static,
        act: impl Fn(&EventPayload<T>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            should_act: Box::new(should_act),
            act: Box::new(act),
        }
    }
}

impl<T: Payload> Actor for FuncActor<T> {
    type Msg = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn should_act(&self, msg: &EventPayload<T>) -> bool {
        (self.should_act)(msg)
    }

    fn act(&self, msg: &EventPayload<T>) -> bool {
        (self.act)(msg)
    }
}
