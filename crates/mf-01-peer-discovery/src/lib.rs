//! # Peer Discovery & Peer Registry
//!
//! Multicast-heartbeat membership for Module-Fabric. Every instance
//! periodically announces its identity and lifecycle state; every instance
//! listens, building an eventually-consistent view of its peers and
//! declaring a peer dead after `PEER_TIMEOUT_FACTOR` silent intervals.
//!
//! There is no consensus and no epoch: each node's registry is its own view.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture with:
//! - **Domain Layer:** Peer registry, heartbeat frame and codec
//! - **Ports Layer:** `HeartbeatTransport`, `PeerStateListener`, `PeerDirectory`
//! - **Service Layer:** `PeerDiscoveryService` send/receive loops
//! - **Adapters Layer:** In-memory multicast group, UDP multicast socket
//!   (feature `network`)
//!
//! ## Example
//!
//! ```rust
//! use mf_01_peer_discovery::{PeerDirectory, PeerRegistry};
//! use shared_types::{ModuleHandle, ModuleLifecycleState, ModuleUniqueId};
//!
//! let registry = PeerRegistry::new();
//! let peer = ModuleHandle::new(ModuleUniqueId::new(1, 0), 1, "Sensor");
//! registry.add(peer, ModuleLifecycleState::Active, Vec::new()).unwrap();
//!
//! assert!(registry.contains_type(1, true));
//! assert_eq!(registry.active_peer_count(), 1);
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{InMemoryHeartbeatTransport, InMemoryMulticastGroup};
#[cfg(feature = "network")]
pub use adapters::UdpMulticastTransport;
pub use domain::{
    CodecError, DiscoveryError, HeartbeatFrame, HeartbeatTransportError, PeerEntry, PeerRegistry,
    RegistryError,
};
pub use ports::{HeartbeatTransport, PeerDirectory, PeerStateListener};
pub use service::{DiscoveryConfig, PeerDiscoveryService, PEER_TIMEOUT_FACTOR};
