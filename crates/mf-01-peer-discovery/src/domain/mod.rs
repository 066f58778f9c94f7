//! # Domain Layer
//!
//! - `registry`: the indexed peer store
//! - `heartbeat`: heartbeat frame and its wire codec
//! - `errors`: domain error types

pub mod errors;
pub mod heartbeat;
pub mod registry;

pub use errors::{CodecError, DiscoveryError, HeartbeatTransportError, RegistryError};
pub use heartbeat::{HeartbeatFrame, MAX_FRAME_BYTES, PROTOCOL_VERSION};
pub use registry::{PeerEntry, PeerRegistry};
