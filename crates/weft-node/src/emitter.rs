//! The emitter abstraction.

use tokio::sync::mpsc;
use weft_event::Payload;

/// A data source for a node to publish `data` events about.
///
/// The stream may be infinite; the node's forwarder task consumes it
/// until it is closed.
pub trait Emitter: Send + 'static {
    /// Payload type this emitter's data events carry.
    type Msg: Payload;

    /// A URL-safe constant name for this emitter; may contain slashes.
    fn name(&self) -> &str;

    /// Consumes the emitter, yielding the stream of values to publish.
    fn into_stream(self) -> mpsc::UnboundedReceiver<Self::Msg>;
}

/// An [`Emitter`] backed by an unbounded channel.
pub struct ChannelEmitter<T> {
    name: String,
    stream: mpsc::UnboundedReceiver<T>,
}

impl<T: Payload> ChannelEmitter<T> {
    /// Creates an emitter draining an existing receiver.
    pub fn new(name: impl Into<String>, stream: mpsc::UnboundedReceiver<T>) -> Self {
        Self {
            name: name.into(),
            stream,
        }
    }

    /// Creates an emitter together with the sender that feeds it.
    pub fn channel(name: impl Into<String>) -> (mpsc::UnboundedSender<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(name, rx))
    }
}

impl<T: Payload> Emitter for ChannelEmitter<T> {
    type Msg = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn into_stream(self) -> mpsc::UnboundedReceiver<T> {
        self.stream
    }
}
