//! # Shared Bus - Messaging Transport for Module-Fabric
//!
//! Defines the transport port the event dispatch engine drives, and an
//! in-memory implementation connecting module instances inside one process.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Instance A  │                    │  Instance B  │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │ InboundSink
//!                  │ Message Bus  │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  router thread
//! ```
//!
//! ## Rules
//!
//! - Events reach an endpoint only if it joined the publisher and holds a
//!   subscription whose topic contains the event's topic.
//! - Requests and replies are point-to-point; a request to a peer that was
//!   never joined fails immediately.
//! - Inbound traffic is handed to the endpoint's `InboundSink` on a
//!   transport-owned thread, in arrival order.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod memory;
pub mod transport;

pub use memory::{InMemoryMessageBus, InMemoryTransport};
pub use transport::{ExternalRequestIdentity, InboundSink, MessageTransport, TransportError};
