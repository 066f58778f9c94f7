//! # Shared Types Crate
//!
//! This crate contains the identity model, lifecycle states, topic and
//! message types, and the configuration port used across Module-Fabric.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-crate types are defined here.
//! - **Immutable Identity**: `ModuleHandle` values are never mutated in place;
//!   binding transport endpoints produces a new handle.
//! - **Explicit Context**: Configuration is passed as a provider object, never
//!   read from process-wide state.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod errors;
pub mod identity;
pub mod lifecycle;
pub mod sync;
pub mod topic;

pub use config::{ConfigProvider, StaticConfigProvider, TomlConfigProvider};
pub use errors::*;
pub use identity::*;
pub use lifecycle::ModuleLifecycleState;
pub use sync::{Latch, StopSignal};
pub use topic::{Message, MessageType, MessageTypeBuilder, MAX_TOPIC_LEN};
