//! The JSON envelope every publish carries.

use crate::{EventError, EventType};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Content type of every event payload on the wire.
///
/// Subscription deliveries with any other content type are ignored.
pub const PAYLOAD_CONTENT_TYPE: &str = "application/vnd.wts-event-payload.v1+json";

/// The message that is sent over the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload<T> {
    /// The event data.
    pub data: T,
    /// When the sender encoded the message.
    pub date_sent: DateTime<Utc>,
    /// What kind of event this payload announces.
    pub event_type: EventType,
    /// Base URL of the originating node.
    pub sender: String,
}

impl<T: Send + Sync + 'static> EventPayload<T> {
    /// Widens the payload into its type-erased form.
    #[must_use]
    pub fn into_any(self) -> AnyPayload {
        AnyPayload {
            data: Box::new(self.data),
            date_sent: self.date_sent,
            event_type: self.event_type,
            sender: self.sender,
        }
    }
}

/// An [`EventPayload`] whose data has been erased to `dyn Any`.
///
/// This is the form that crosses a node's registry boundary: the registry
/// cannot know the payload type, so hooks and actor proxies re-narrow with
/// [`AnyPayload::downcast`] before invoking typed user code.
pub struct AnyPayload {
    /// The event data, concretely the `T` the decoding codec was built with.
    pub data: Box<dyn Any + Send + Sync>,
    /// When the sender encoded the message.
    pub date_sent: DateTime<Utc>,
    /// What kind of event this payload announces.
    pub event_type: EventType,
    /// Base URL of the originating node.
    pub sender: String,
}

impl AnyPayload {
    /// Re-narrows the payload to `T`, cloning the data out.
    ///
    /// Returns `None` when the erased data is not actually a `T`.
    #[must_use]
    pub fn downcast<T: Clone + 'static>(&self) -> Option<EventPayload<T>> {
        self.data.downcast_ref::<T>().map(|data| EventPayload {
            data: data.clone(),
            date_sent: self.date_sent,
            event_type: self.event_type,
            sender: self.sender.clone(),
        })
    }
}

impl fmt::Debug for AnyPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyPayload")
            .field("date_sent", &self.date_sent)
            .field("event_type", &self.event_type)
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

/// Encodes a message into the wire envelope, stamping the send time.
///
/// # Errors
///
/// Returns [`EventError::Json`] when the data cannot be serialized.
pub fn encode_message<T: Serialize>(
    data: &T,
    event_type: EventType,
    sender: &str,
) -> Result<Vec<u8>, EventError> {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Envelope<'a, T> {
        data: &'a T,
        date_sent: DateTime<Utc>,
        event_type: EventType,
        sender: &'a str,
    }

    Ok(serde_json::to_vec(&Envelope {
        data,
        date_sent: Utc::now(),
        event_type,
        sender,
    })?)
}

/// Decodes a wire envelope into a typed payload.
///
/// # Errors
///
/// Returns [`EventError::Json`] when the bytes are not a valid envelope
/// or the data does not have the shape of `T`.
pub fn decode_message<T: DeserializeOwned>(bytes: &[u8]) -> Result<EventPayload<T>, EventError> {
    Ok(serde_json::from_slice(bytes)?)
}
