//! # Adapters Layer
//!
//! Concrete `HeartbeatTransport` implementations.
//!
//! - `memory` - In-process multicast group (always available)
//! - `udp` - IPv4 multicast socket (requires "network" feature)

pub mod memory;

#[cfg(feature = "network")]
pub mod udp;

pub use memory::{InMemoryHeartbeatTransport, InMemoryMulticastGroup};

#[cfg(feature = "network")]
pub use udp::UdpMulticastTransport;
