//! The closed set of event kinds a topic can carry.

use crate::EventError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of event carried on a topic, always the final path segment of an
/// event URL.
///
/// | Kind | Sent by | Meaning |
/// |------|---------|---------|
/// | `Request` | anyone | ask the owning node to perform the action |
/// | `Executed` | owning node | the action was performed |
/// | `Data` | owning node | an emitter produced a value |
///
/// The set is closed: any other tail on a topic path is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Another service requested the action to be performed.
    Request,
    /// The action was performed successfully.
    Executed,
    /// An emitter produced a data value.
    Data,
}

impl EventType {
    /// The wire form of this event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Executed => "executed",
            Self::Data => "data",
        }
    }

    /// All event types, in no particular order.
    pub const ALL: [EventType; 3] = [Self::Request, Self::Executed, Self::Data];
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request" => Ok(Self::Request),
            "executed" => Ok(Self::Executed),
            "data" => Ok(Self::Data),
            other => Err(EventError::UnknownEventType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_all_variants() {
        for kind in EventType::ALL {
            assert_eq!(kind.as_str().parse::<EventType>().unwrap(), kind);
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!("published".parse::<EventType>().is_err());
        assert!("".parse::<EventType>().is_err());
        assert!("Request".parse::<EventType>().is_err());
    }

    #[test]
    fn serde_wire_form_is_lowercase() {
        let json = serde_json::to_string(&EventType::Executed).unwrap();
        assert_eq!(json, "\"executed\"");
        let back: EventType = serde_json::from_str("\"data\"").unwrap();
        assert_eq!(back, EventType::Data);
    }

    #[test]
    fn display_roundtrip() {
        for kind in EventType::ALL {
            assert_eq!(kind.to_string().parse::<EventType>().unwrap(), kind);
        }
    }
}
