//! # Peer Discovery Service
//!
//! Drives the registry from multicast heartbeats.
//!
//! ## Send loop
//!
//! Every broadcast interval: emit a heartbeat, advance every peer's silence
//! by one interval, and remove peers silent for longer than
//! `PEER_TIMEOUT_FACTOR` intervals, reporting each as `Dead` exactly once.
//!
//! ## Receive loop
//!
//! Per heartbeat: ignore our own frames (same identity *and* nonce), ignore
//! same-type peers when configured, then add, update or remove the sender
//! and report the transition. Registry mutation and the report happen under
//! one membership lock, so a listener never observes a stale registry.

mod config;
mod core;
mod maintenance;

pub use self::config::{
    DiscoveryConfig, BROADCAST_INTERVAL_KEY, DEFAULT_BROADCAST_INTERVAL, PEER_TIMEOUT_FACTOR,
};
pub use self::core::PeerDiscoveryService;
