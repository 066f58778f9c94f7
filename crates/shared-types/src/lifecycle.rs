//! Lifecycle state advertised by every module instance.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Participation state of a module, ordered `Dead < Inactive < Active`.
///
/// `Dead` doubles as the "not present" state: a peer that was never seen
/// or has been removed reports `Dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModuleLifecycleState {
    Dead = 0,
    Inactive = 1,
    Active = 2,
}

impl ModuleLifecycleState {
    /// Wire ordinal of this state.
    #[must_use]
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Decode a wire ordinal. Unknown values yield `None`.
    #[must_use]
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(Self::Dead),
            1 => Some(Self::Inactive),
            2 => Some(Self::Active),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl fmt::Display for ModuleLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dead => "DEAD",
            Self::Inactive => "INACTIVE",
            Self::Active => "ACTIVE",
        };
        f.write_str(name)
    }
}
