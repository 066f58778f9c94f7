//! Cross-crate scenarios.

pub mod dependencies;
pub mod ordering;
pub mod peer_timeout;
pub mod remote_control;
pub mod uniqueness;
