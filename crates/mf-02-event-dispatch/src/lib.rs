//! # Event Dispatch Engine
//!
//! Delivers inbound events, inbound requests and peer-state changes to
//! module code one at a time, in arrival order, on a single delivery thread.
//!
//! ## Responsibilities
//!
//! - Topic-prefix subscriptions with multicast delivery to every match
//! - Producer-side backpressure (`block` or `drop` when the queue is full)
//! - Outbound request correlation through [`InReply`]
//! - At-most-once replies to inbound requests ([`OutReply`], [`FutureReply`])
//! - Remote lifecycle control through reserved system messages
//!
//! ## Example
//!
//! ```rust,ignore
//! let dispatcher = EventDispatcher::new(module, bus.transport(), control, DispatchConfig::default());
//! let bound = dispatcher.start(&self_handle)?;
//! dispatcher.on_enable()?;
//!
//! dispatcher.subscribe(topic, Arc::new(|msg: &Message, sender: ModuleUniqueId| {
//!     println!("{sender}: {}", msg.topic);
//! }))?;
//! let reply = dispatcher.send_request(&peer, request)?.get_timeout(Duration::from_secs(1))?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod handlers;
mod queue;
pub mod reply;
pub mod subscriptions;
pub mod system;


pub use config::{DispatchConfig, OverflowPolicy};
pub use dispatcher::EventDispatcher;
pub use errors::{DispatchError, RequestError};
pub use handlers::{
    EventHandler, LifecycleControl, ModuleCallbacks, RequestHandler, SharedModule, StateChangeHandler,
};
pub use reply::{FutureReply, InReply, OutReply};
pub use subscriptions::SubscriptionHandle;
pub use system::{SystemCommand, SYSTEM_REPLY_TOPIC, SYSTEM_REQUEST_TOPIC};
