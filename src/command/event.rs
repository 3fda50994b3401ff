//! Command events and the payload dispatch rule

use bytes::Bytes;

use crate::mqtt::Publish;

/// Payload that triggers a feed
pub const FEED_PAYLOAD: &[u8] = b"hi";

/// Payload that triggers the secondary action
pub const SECONDARY_PAYLOAD: &[u8] = b"yes!";

/// A message delivered by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    pub topic: String,
    pub payload: Bytes,
}

impl CommandEvent {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// The command this event maps to, if any
    pub fn command(&self) -> Option<Command> {
        Command::from_payload(&self.payload)
    }
}

impl From<Publish> for CommandEvent {
    fn from(publish: Publish) -> Self {
        Self {
            topic: publish.topic,
            payload: publish.payload,
        }
    }
}

/// Actuation requested by a command message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the feeder motor
    Feed,
    /// The second, distinct action
    Secondary,
}

impl Command {
    /// Exact payload match; anything else is not a command
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            FEED_PAYLOAD => Some(Command::Feed),
            SECONDARY_PAYLOAD => Some(Command::Secondary),
            _ => None,
        }
    }
}
