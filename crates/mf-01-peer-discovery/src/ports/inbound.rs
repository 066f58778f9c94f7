//! # Driving Ports (Inbound API)
//!
//! Read-only view of the peer registry handed to module code.
//!
//! Every query takes `only_active`: `true` consults the active view (peers
//! whose advertised state is `Active`), `false` the full view.

use std::collections::HashMap;

use shared_types::{ModuleHandle, ModuleLifecycleState, ModuleUniqueId};

/// Queries over the set of known peers.
pub trait PeerDirectory: Send + Sync {
    fn contains(&self, id: &ModuleUniqueId, only_active: bool) -> bool;

    fn get(&self, id: &ModuleUniqueId, only_active: bool) -> Option<ModuleHandle>;

    fn contains_type(&self, type_id: u16, only_active: bool) -> bool;

    /// All peers of a type, in the order they were first seen.
    fn list_by_type(&self, type_id: u16, only_active: bool) -> Vec<ModuleHandle>;

    /// The earliest-seen peer of a type.
    fn any_by_type(&self, type_id: u16, only_active: bool) -> Option<ModuleHandle>;

    fn contains_type_version(&self, type_id: u16, version: u16, only_active: bool) -> bool;

    fn list_by_type_version(&self, type_id: u16, version: u16, only_active: bool) -> Vec<ModuleHandle>;

    fn any_by_type_version(&self, type_id: u16, version: u16, only_active: bool) -> Option<ModuleHandle>;

    /// Advertised state, or `Dead` for unknown peers.
    fn state_of(&self, id: &ModuleUniqueId) -> ModuleLifecycleState;

    fn additional_state_of(&self, id: &ModuleUniqueId) -> Option<Vec<u8>>;

    /// Owned copy of the chosen view keyed by id.
    fn peers_snapshot(&self, only_active: bool) -> HashMap<ModuleUniqueId, ModuleHandle>;

    /// Owned copy of the chosen view grouped by module type.
    fn peers_by_type_snapshot(&self, only_active: bool) -> HashMap<u16, Vec<ModuleHandle>>;

    fn peer_count(&self) -> usize;

    fn active_peer_count(&self) -> usize;
}
