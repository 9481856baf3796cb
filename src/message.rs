use crate::wire::BasicProperties;
use std::fmt;
use uuid::Uuid;

/// The unique id of a [`Message`](struct.Message.html).
///
/// GUIDs are the deduplication key of the publisher-confirm engine: at most
/// one message per GUID may be outstanding on a session at a time, and
/// messages are resent across reconnects under the same GUID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid(Uuid);

impl Guid {
    /// Generates a fresh random GUID.
    pub fn new() -> Guid {
        Guid(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Guid> {
        Uuid::parse_str(s).ok().map(Guid)
    }
}

impl Default for Guid {
    fn default() -> Guid {
        Guid::new()
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An outgoing message: payload bytes, properties, and an immutable GUID
/// assigned at construction (or supplied by the application).
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    guid: Guid,
    properties: BasicProperties,
    body: Vec<u8>,
}

impl Message {
    /// Builds a message with default properties and a fresh GUID.
    pub fn new<B: Into<Vec<u8>>>(body: B) -> Message {
        Message::with_properties(body, BasicProperties::default())
    }

    pub fn with_properties<B: Into<Vec<u8>>>(body: B, properties: BasicProperties) -> Message {
        Message {
            guid: Guid::new(),
            properties,
            body: body.into(),
        }
    }

    /// Builds a message under an application-chosen GUID. Sending two
    /// messages with the same GUID while the first is unconfirmed is
    /// reported as a duplicate.
    pub fn with_guid<B: Into<Vec<u8>>>(
        guid: Guid,
        body: B,
        properties: BasicProperties,
    ) -> Message {
        Message {
            guid,
            properties,
            body: body.into(),
        }
    }

    #[inline]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[inline]
    pub fn properties(&self) -> &BasicProperties {
        &self.properties
    }

    pub(crate) fn properties_mut(&mut self) -> &mut BasicProperties {
        &mut self.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_messages_get_distinct_guids() {
        let a = Message::new("x");
        let b = Message::new("x");
        assert_ne!(a.guid(), b.guid());
    }

    #[test]
    fn guid_survives_display_round_trip() {
        let guid = Guid::new();
        let parsed = Guid::parse(&guid.to_string()).unwrap();
        assert_eq!(guid, parsed);
    }
}
