//! # Ports Layer
//!
//! - `inbound`: read-only registry queries offered to module code
//! - `outbound`: heartbeat transport and peer-state listener the host provides

pub mod inbound;
pub mod outbound;

pub use inbound::PeerDirectory;
pub use outbound::{HeartbeatTransport, PeerStateListener};
