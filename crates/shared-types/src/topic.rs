//! # Topics and Messages
//!
//! A topic (`MessageType`) is a byte string of at most 32 bytes. Subscriptions
//! match by prefix: topic `A` contains topic `B` iff `A` is no longer than `B`
//! and equals `B`'s first `len(A)` bytes. The empty topic contains everything.
//!
//! Topics are usually assembled from big-endian segments with
//! `MessageTypeBuilder`, e.g. `[module type][event kind][sub kind]`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::TopicError;

/// Maximum topic length in bytes.
pub const MAX_TOPIC_LEN: usize = 32;

// =============================================================================
// MESSAGE TYPE
// =============================================================================

/// A topic used for subscription matching and request routing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageType {
    bytes: Vec<u8>,
}

impl MessageType {
    /// Create a topic from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `TopicError::TooLong` if `bytes` exceeds `MAX_TOPIC_LEN`.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, TopicError> {
        let bytes = bytes.into();
        if bytes.len() > MAX_TOPIC_LEN {
            return Err(TopicError::TooLong {
                len: bytes.len(),
                max: MAX_TOPIC_LEN,
            });
        }
        Ok(Self { bytes })
    }

    /// The empty topic, which contains every other topic.
    #[must_use]
    pub fn match_all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Prefix containment: true iff `self` is a prefix of `other`.
    #[must_use]
    pub fn contains(&self, other: &MessageType) -> bool {
        other.bytes.starts_with(&self.bytes)
    }

    /// Replace the leading bytes of this topic with `prefix`.
    ///
    /// If `prefix` is longer than `self`, the result is `prefix`.
    #[must_use]
    pub fn with_prefix_overridden(&self, prefix: &MessageType) -> MessageType {
        let mut bytes = prefix.bytes.clone();
        if self.bytes.len() > bytes.len() {
            bytes.extend_from_slice(&self.bytes[prefix.bytes.len()..]);
        }
        MessageType { bytes }
    }
}

impl TryFrom<&[u8]> for MessageType {
    type Error = TopicError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::new(value.to_vec())
    }
}

impl fmt::Display for MessageType {
    /// Dot-separated unsigned bytes followed by `|len`, e.g. `3.255|2`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{b}")?;
        }
        write!(f, "|{}", self.bytes.len())
    }
}

// =============================================================================
// MESSAGE TYPE BUILDER
// =============================================================================

/// Assembles a topic from big-endian segments.
#[derive(Debug, Clone, Default)]
pub struct MessageTypeBuilder {
    bytes: Vec<u8>,
}

impl MessageTypeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn append_u8(mut self, value: u8) -> Self {
        self.bytes.push(value);
        self
    }

    #[must_use]
    pub fn append_u16(mut self, value: u16) -> Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    #[must_use]
    pub fn append_u32(mut self, value: u32) -> Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    #[must_use]
    pub fn append_u64(mut self, value: u64) -> Self {
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Finish the topic.
    ///
    /// # Errors
    ///
    /// Returns `TopicError::TooLong` if the appended segments exceed
    /// `MAX_TOPIC_LEN`.
    pub fn build(self) -> Result<MessageType, TopicError> {
        MessageType::new(self.bytes)
    }
}

// =============================================================================
// MESSAGE
// =============================================================================

/// A topic plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub topic: MessageType,
    pub payload: Vec<u8>,
}

impl Message {
    #[must_use]
    pub fn new(topic: MessageType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic,
            payload: payload.into(),
        }
    }
}
