//! # Module-Fabric Test Suite
//!
//! Multi-instance scenarios that exercise discovery, dispatch and the
//! lifecycle coordinator together over the in-memory heartbeat group and
//! message bus.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # Scripted module, shared network, polling helpers
//! └── integration/      # One file per scenario family
//!     ├── dependencies.rs
//!     ├── peer_timeout.rs
//!     ├── remote_control.rs
//!     ├── ordering.rs
//!     └── uniqueness.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p mf-tests
//! cargo test -p mf-tests integration::peer_timeout::
//! ```

pub mod harness;
pub mod integration;
