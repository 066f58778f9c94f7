//! # Heartbeat Frames
//!
//! One heartbeat announces a module's identity, lifecycle state and
//! free-form additional state to the multicast group.
//!
//! ## Wire Format
//!
//! ```text
//! [ 'M' 'F' ][ version (1) ][ bincode body (varint ints, ≤ 64 KiB) ]
//! ```

use bincode::Options;
use serde::{Deserialize, Serialize};
use shared_types::{ModuleHandle, ModuleLifecycleState};

use crate::domain::errors::CodecError;

const MAGIC: [u8; 2] = *b"MF";

/// Current heartbeat protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Largest body accepted when decoding.
pub const MAX_FRAME_BYTES: u64 = 64 * 1024;

const HEADER_LEN: usize = MAGIC.len() + 1;

/// A single heartbeat as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatFrame {
    /// Sender identity, version, name and transport endpoint hints.
    pub handle: ModuleHandle,
    /// `ModuleLifecycleState` ordinal.
    pub lifecycle: u8,
    pub additional_state: Vec<u8>,
    /// Random per-process value distinguishing our own frames from a
    /// duplicate instance with the same identity.
    pub nonce: u32,
}

impl HeartbeatFrame {
    #[must_use]
    pub fn new(
        handle: ModuleHandle,
        state: ModuleLifecycleState,
        additional_state: Vec<u8>,
        nonce: u32,
    ) -> Self {
        Self {
            handle,
            lifecycle: state.ordinal(),
            additional_state,
            nonce,
        }
    }

    /// Decoded lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::UnknownState` for ordinals outside the known set.
    pub fn lifecycle_state(&self) -> Result<ModuleLifecycleState, CodecError> {
        ModuleLifecycleState::from_ordinal(self.lifecycle)
            .ok_or(CodecError::UnknownState(self.lifecycle))
    }

    fn options() -> impl Options {
        bincode::DefaultOptions::new().with_limit(MAX_FRAME_BYTES)
    }

    /// Encode for the wire.
    ///
    /// # Errors
    ///
    /// Fails if the body exceeds `MAX_FRAME_BYTES`.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let body = Self::options()
            .serialize(self)
            .map_err(|e| CodecError::Malformed(e.to_string()))?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
        bytes.extend_from_slice(&MAGIC);
        bytes.push(PROTOCOL_VERSION);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Decode a frame received from the wire.
    ///
    /// # Errors
    ///
    /// Fails on a short or foreign frame, an unsupported version, or a
    /// malformed body.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::TooShort(bytes.len()));
        }
        if bytes[..MAGIC.len()] != MAGIC {
            return Err(CodecError::BadMagic);
        }
        let version = bytes[MAGIC.len()];
        if version != PROTOCOL_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        Self::options()
            .deserialize(&bytes[HEADER_LEN..])
            .map_err(|e| CodecError::Malformed(e.to_string()))
    }
}
