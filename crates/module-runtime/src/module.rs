//! # Module Trait
//!
//! Application logic hosted by a `ModuleInstance`. A module declares its
//! identity and dependencies, and receives a [`FrameworkAccess`] handle each
//! time it is enabled.
//!
//! All callbacks (`enable`, `disable`, `handle_request`,
//! `handle_module_state_change` and subscription handlers) are serialized:
//! module code is never called concurrently with itself.
//!
//! ## Example
//!
//! ```rust,ignore
//! struct Thermometer {
//!     framework: Option<FrameworkAccess>,
//! }
//!
//! impl RequestHandler for Thermometer {}
//! impl StateChangeHandler for Thermometer {}
//!
//! impl Module for Thermometer {
//!     fn unique_id(&self) -> ModuleUniqueId { ModuleUniqueId::new(7, 0) }
//!     fn version(&self) -> u16 { 1 }
//!     fn name(&self) -> &str { "Thermometer" }
//!
//!     fn enable(&mut self, framework: FrameworkAccess) -> Result<(), ModuleError> {
//!         framework.publish(&Message::new(topic, b"online".to_vec()))?;
//!         self.framework = Some(framework);
//!         Ok(())
//!     }
//!
//!     fn disable(&mut self) {
//!         self.framework = None;
//!     }
//! }
//! ```

use mf_02_event_dispatch::{RequestHandler, StateChangeHandler};
use shared_types::{ModuleDependency, ModuleUniqueId};

use crate::access::FrameworkAccess;
use crate::errors::ModuleError;

/// A unit of application logic hosted by the framework.
pub trait Module: RequestHandler + StateChangeHandler + Send + 'static {
    fn unique_id(&self) -> ModuleUniqueId;

    fn version(&self) -> u16;

    fn name(&self) -> &str;

    /// Peer types that must be active before this module may enable.
    fn dependencies(&self) -> Vec<ModuleDependency> {
        Vec::new()
    }

    /// Start the module's work. An error (or a panic) leaves the module
    /// disabled.
    fn enable(&mut self, framework: FrameworkAccess) -> Result<(), ModuleError>;

    /// Stop the module's work. Subscriptions are already gone by now.
    fn disable(&mut self);
}
