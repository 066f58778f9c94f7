//! # Module Runtime
//!
//! Hosts one [`Module`] per [`ModuleInstance`]. The instance owns a peer
//! discovery engine and an event dispatcher, and runs the lifecycle
//! coordinator that enables the module once its declared dependencies are
//! active on the network and disables it when they go away.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────── ModuleInstance ───────────────────────┐
//!  heartbeats ──► │ PeerDiscoveryService ──► PeerRegistry                         │
//!                 │        │ peer transitions      ▲ deps / uniqueness            │
//!                 │        ▼                       │                              │
//!                 │  EventDispatcher ◄──── mf-coordinator ────► Module.enable()   │
//!  messages  ──►  │        │ mf-delivery                                          │
//!                 │        └──► Module callbacks (serialized)                     │
//!                 └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! let instance = InstanceBuilder::new(MyModule::default())
//!     .logging(TelemetryConfig::from_env())
//!     .heartbeat(group.endpoint())
//!     .transport(bus.transport())
//!     .launch()?;
//! instance.join_execution();
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod access;
pub mod errors;
pub mod instance;
pub mod launcher;
pub mod module;

pub use access::FrameworkAccess;
pub use errors::{FrameworkError, ModuleError, StartError};
pub use instance::{EnabledState, ModuleInstance, StartOptions};
pub use launcher::InstanceBuilder;
pub use module::Module;

pub use fabric_telemetry::TelemetryConfig;

pub use mf_02_event_dispatch::{
    EventHandler, FutureReply, InReply, OutReply, RequestError, RequestHandler, StateChangeHandler,
    SubscriptionHandle,
};
