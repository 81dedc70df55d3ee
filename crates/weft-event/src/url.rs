//! Event URL parsing and composition.
//!
//! An event URL is any URL whose path ends with `/request`, `/executed`,
//! or `/data`; everything before that tail is the entity URL.

use crate::{EventError, EventType};
use url::Url;

/// Splits an event URL into its entity URL and event type.
///
/// Leading and trailing slashes on the path are tolerated; the canonical
/// entity URL returned never carries a trailing slash.
///
/// # Errors
///
/// Fails when the input is not a URL, when the path has no internal slash
/// to split at, or when the final segment is not a valid [`EventType`].
///
/// # Example
///
/// ```
/// use weft_event::{parse_event_url, EventType};
///
/// let (entity, kind) = parse_event_url("http://localhost:4044/door/executed/").unwrap();
/// assert_eq!(entity, "http://localhost:4044/door");
/// assert_eq!(kind, EventType::Executed);
/// ```
pub fn parse_event_url(event_url: &str) -> Result<(String, EventType), EventError> {
    let parsed = Url::parse(event_url)?;

    let path = parsed.path().trim_matches('/').to_string();

    let Some(last_slash) = path.rfind('/') else {
        return Err(EventError::MissingEventType);
    };

    let (entity_path, tail) = (&path[..last_slash], &path[last_slash + 1..]);
    let event_type: EventType = tail.parse()?;

    let mut entity = parsed;
    entity.set_path(entity_path);

    Ok((entity.to_string(), event_type))
}

/// Joins an entity URL and an event type into the topic it is published on.
///
/// The inverse of [`parse_event_url`] for entity URLs that survive a
/// parse/compose round trip.
#[must_use]
pub fn compose_event_url(entity_url: &str, event_type: EventType) -> String {
    format!("{}/{}", entity_url.trim_end_matches('/'), event_type)
}
