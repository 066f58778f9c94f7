//! # Fabric Telemetry
//!
//! Logging setup for processes hosting Module-Fabric instances. All crates
//! log through `tracing`; this crate installs the subscriber that formats
//! and filters those events.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fabric_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&TelemetryConfig::for_module("thermometer"))?;
//!     // start module instances here
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MF_LOG_LEVEL` / `RUST_LOG` | `info` | `EnvFilter` directive |
//! | `MF_JSON_LOGS` | `false` | JSON lines output |
//! | `MF_THREAD_NAMES` | `true` | Thread names in each line |
//! | `MF_SERVICE_NAME` | `module-fabric` | Service name |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("invalid log filter '{directive}': {reason}")]
    Filter { directive: String, reason: String },

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}
