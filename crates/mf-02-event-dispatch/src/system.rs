//! # System Control Messages
//!
//! Requests on the reserved topic `[0x03, 0xFF]` drive a remote instance's
//! lifecycle. The first payload byte selects the action; the target
//! acknowledges on `[0x04, 0xFF]` echoing that byte before acting. Unknown
//! actions are answered with an error text instead.
//!
//! System requests bypass the delivery queue and are honoured whether or not
//! the module is enabled.

use shared_types::{Message, MessageType};

pub const SYSTEM_REQUEST_TOPIC: [u8; 2] = [0x03, 0xFF];
pub const SYSTEM_REPLY_TOPIC: [u8; 2] = [0x04, 0xFF];

/// Payload of the reply to an unknown system action.
pub const UNKNOWN_SYSTEM_MESSAGE: &[u8] = b"unknown system message";

/// A lifecycle action requested by a remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SystemCommand {
    Disable = 0x01,
    Stop = 0x02,
    Enable = 0x03,
}

fn topic(bytes: [u8; 2]) -> MessageType {
    MessageType::new(bytes.to_vec()).unwrap_or_default()
}

impl SystemCommand {
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::Disable),
            0x02 => Some(Self::Stop),
            0x03 => Some(Self::Enable),
            _ => None,
        }
    }

    /// The request message carrying this command.
    #[must_use]
    pub fn request(self) -> Message {
        Message::new(topic(SYSTEM_REQUEST_TOPIC), vec![self.code()])
    }

    /// The positive acknowledgement for this command.
    #[must_use]
    pub fn ack(self) -> Message {
        Message::new(topic(SYSTEM_REPLY_TOPIC), vec![self.code()])
    }

    /// True if `reply` positively acknowledges this command.
    #[must_use]
    pub fn is_acked_by(self, reply: &Message) -> bool {
        reply.topic.as_bytes() == SYSTEM_REPLY_TOPIC && reply.payload.first() == Some(&self.code())
    }
}

pub(crate) fn is_system_request(message: &Message) -> bool {
    message.topic.as_bytes() == SYSTEM_REQUEST_TOPIC
}

pub(crate) fn unknown_command_reply() -> Message {
    Message::new(topic(SYSTEM_REPLY_TOPIC), UNKNOWN_SYSTEM_MESSAGE.to_vec())
}
