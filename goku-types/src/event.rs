use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of mutation an event describes.
///
/// Codes are persisted in the event log and must never be re-assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Synthetic entry recorded by the gap filler for an event id that was
    /// allocated but never committed. Carries no mutation.
    Noop = 0,
    Set = 1,
    Delete = 2,
    Expire = 3,
}

impl EventType {
    #[must_use]
    pub fn code(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for EventType {
    type Error = InvalidEventType;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(EventType::Noop),
            1 => Ok(EventType::Set),
            2 => Ok(EventType::Delete),
            3 => Ok(EventType::Expire),
            other => Err(InvalidEventType(other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid event type code `{0}`")]
pub struct InvalidEventType(pub i64);

/// One entry of the append-only event log.
///
/// Event ids are the canonical total order of mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub kind: EventType,
    pub key: String,
    pub timestamp: DateTime<Utc>,
    /// The new value for set events, empty otherwise.
    pub metadata: Vec<u8>,
}
