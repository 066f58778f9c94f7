//! # Module Identity
//!
//! Identity types that travel in heartbeats and key the peer registry.
//!
//! - `ModuleUniqueId` - (type, instance) pair, displayed as `type:instance`
//! - `ModuleHandle` - identity plus version, display name and endpoints
//! - `ModuleDependency` - activation precondition on a peer type

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::IdParseError;

// =============================================================================
// MODULE UNIQUE ID
// =============================================================================

/// Identity of a module instance on the network.
///
/// Equality and hashing use both the type and the instance number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleUniqueId {
    /// Module type, shared by all instances of the same module.
    pub type_id: u16,
    /// Instance number, distinguishing instances of one type.
    pub instance_id: u64,
}

impl ModuleUniqueId {
    #[must_use]
    pub const fn new(type_id: u16, instance_id: u64) -> Self {
        Self {
            type_id,
            instance_id,
        }
    }
}

impl fmt::Display for ModuleUniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_id, self.instance_id)
    }
}

impl FromStr for ModuleUniqueId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (type_part, instance_part) = s
            .split_once(':')
            .ok_or_else(|| IdParseError::MissingSeparator(s.to_string()))?;
        let type_id = type_part
            .trim()
            .parse::<u16>()
            .map_err(|_| IdParseError::InvalidType(s.to_string()))?;
        let instance_id = instance_part
            .trim()
            .parse::<u64>()
            .map_err(|_| IdParseError::InvalidInstance(s.to_string()))?;
        Ok(Self::new(type_id, instance_id))
    }
}

// =============================================================================
// TRANSPORT ENDPOINTS
// =============================================================================

/// Addresses a module's messaging transport is reachable on.
///
/// Opaque to the framework core; only the transport interprets them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportEndpoints {
    /// Address peers subscribe to for published events.
    pub publish: String,
    /// Address peers send requests to.
    pub request: String,
}

impl TransportEndpoints {
    #[must_use]
    pub fn new(publish: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            publish: publish.into(),
            request: request.into(),
        }
    }

    /// True if no endpoint has been bound yet.
    #[must_use]
    pub fn is_unbound(&self) -> bool {
        self.publish.is_empty() && self.request.is_empty()
    }
}

// =============================================================================
// MODULE HANDLE
// =============================================================================

/// Everything a peer needs to know about a module instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleHandle {
    pub unique_id: ModuleUniqueId,
    pub version: u16,
    pub name: String,
    pub endpoints: TransportEndpoints,
}

impl ModuleHandle {
    /// Create a handle with no bound endpoints.
    #[must_use]
    pub fn new(unique_id: ModuleUniqueId, version: u16, name: impl Into<String>) -> Self {
        Self {
            unique_id,
            version,
            name: name.into(),
            endpoints: TransportEndpoints::default(),
        }
    }

    /// Return a copy of this handle advertising the given endpoints.
    #[must_use]
    pub fn with_endpoints(&self, endpoints: TransportEndpoints) -> Self {
        Self {
            endpoints,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn type_id(&self) -> u16 {
        self.unique_id.type_id
    }

    /// `name(type):instance_vVersion`, used in log lines.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{}({}):{}_v{}",
            self.name, self.unique_id.type_id, self.unique_id.instance_id, self.version
        )
    }
}

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.unique_id.instance_id)
    }
}

// =============================================================================
// MODULE DEPENDENCY
// =============================================================================

/// A precondition for enabling a module: an active peer of the given type.
///
/// With a version, only peers advertising exactly that version satisfy it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleDependency {
    pub type_id: u16,
    pub version: Option<u16>,
}

impl ModuleDependency {
    /// Depend on any version of a module type.
    #[must_use]
    pub const fn on_type(type_id: u16) -> Self {
        Self {
            type_id,
            version: None,
        }
    }

    /// Depend on one exact version of a module type.
    #[must_use]
    pub const fn on_version(type_id: u16, version: u16) -> Self {
        Self {
            type_id,
            version: Some(version),
        }
    }
}

impl fmt::Display for ModuleDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "{}_v{}", self.type_id, v),
            None => write!(f, "{}", self.type_id),
        }
    }
}
