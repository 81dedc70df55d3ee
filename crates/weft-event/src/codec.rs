//! Type-erased payload codecs.
//!
//! A node's registries store entities of many payload types in a single
//! map, so the registration site captures the payload type inside a codec
//! object and the registry only ever sees the erased [`PayloadCodec`]
//! interface. The identity of `T` lives in the method implementations.

use crate::payload::{decode_message, encode_message, AnyPayload};
use crate::{EventError, EventType};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::marker::PhantomData;

/// Bounds every payload type must satisfy.
///
/// Blanket-implemented; any JSON-shaped `Clone` type qualifies.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Object-safe encode/decode pair bound to a payload type chosen at
/// registration time.
pub trait PayloadCodec: Send + Sync {
    /// Name of the payload type this codec was registered with.
    fn type_name(&self) -> &'static str;

    /// Encodes a value into the wire envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::TypeMismatch`] when the dynamic type of
    /// `data` is not the registered type, or [`EventError::Json`] when
    /// serialization fails.
    fn encode(
        &self,
        data: &(dyn Any + Send + Sync),
        event_type: EventType,
        sender: &str,
    ) -> Result<Vec<u8>, EventError>;

    /// Decodes a wire envelope, producing the widened payload.
    ///
    /// The data inside the result is concretely the registered type, so a
    /// later [`AnyPayload::downcast`] to it always succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Json`] when the bytes are not an envelope
    /// whose data has the registered shape.
    fn decode(&self, bytes: &[u8]) -> Result<AnyPayload, EventError>;
}

impl std::fmt::Debug for dyn PayloadCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCodec")
            .field("type_name", &self.type_name())
            .finish()
    }
}

/// The JSON codec for a concrete payload type.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// Creates a codec bound to `T`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Payload> PayloadCodec for JsonCodec<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn encode(
        &self,
        data: &(dyn Any + Send + Sync),
        event_type: EventType,
        sender: &str,
    ) -> Result<Vec<u8>, EventError> {
        let typed = data
            .downcast_ref::<T>()
            .ok_or(EventError::TypeMismatch {
                expected: std::any::type_name::<T>(),
            })?;

        encode_message(typed, event_type, sender)
    }

    fn decode(&self, bytes: &[u8]) -> Result<AnyPayload, EventError> {
        Ok(decode_message::<T>(bytes)?.into_any())
    }
}
