//! # Peer Registry
//!
//! Concurrent indexed store of known peers, maintained by the discovery
//! engine and queried by the lifecycle coordinator and module code.
//!
//! ## Views
//!
//! - **All peers**: every peer with a live heartbeat, by id and by type
//! - **Active peers**: the subset whose advertised state is `Active`
//!
//! ## Invariants
//!
//! - The active view is a subset of the full view.
//! - A peer is in the active view iff its state is `Active`; state changes
//!   and index maintenance happen under one write lock.
//! - The by-type groupings hold exactly the ids of their view.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::RwLock;
use shared_types::{ModuleHandle, ModuleLifecycleState, ModuleUniqueId};
use tracing::{info, warn};

use crate::domain::errors::RegistryError;
use crate::ports::PeerDirectory;

/// A registered peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    pub handle: ModuleHandle,
    pub state: ModuleLifecycleState,
    pub additional_state: Vec<u8>,
    /// Time since the last heartbeat, advanced by the send loop.
    pub(crate) silence: Duration,
}

#[derive(Debug, Default)]
struct Tables {
    peers: HashMap<ModuleUniqueId, PeerEntry>,
    by_type: HashMap<u16, Vec<ModuleUniqueId>>,
    active: HashSet<ModuleUniqueId>,
    active_by_type: HashMap<u16, Vec<ModuleUniqueId>>,
}

impl Tables {
    fn group(&self, only_active: bool) -> &HashMap<u16, Vec<ModuleUniqueId>> {
        if only_active {
            &self.active_by_type
        } else {
            &self.by_type
        }
    }

    fn visible(&self, id: &ModuleUniqueId, only_active: bool) -> Option<&PeerEntry> {
        if only_active && !self.active.contains(id) {
            return None;
        }
        self.peers.get(id)
    }

    fn of_type(&self, type_id: u16, only_active: bool) -> impl Iterator<Item = &PeerEntry> {
        self.group(only_active)
            .get(&type_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.peers.get(id))
    }

    fn set_active(&mut self, id: ModuleUniqueId, active: bool) {
        if active {
            if self.active.insert(id) {
                self.active_by_type.entry(id.type_id).or_default().push(id);
            }
        } else if self.active.remove(&id) {
            unindex(&mut self.active_by_type, &id);
        }
    }
}

fn unindex(groups: &mut HashMap<u16, Vec<ModuleUniqueId>>, id: &ModuleUniqueId) {
    if let Some(ids) = groups.get_mut(&id.type_id) {
        ids.retain(|other| other != id);
        if ids.is_empty() {
            groups.remove(&id.type_id);
        }
    }
}

/// Thread-safe peer registry.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    tables: RwLock<Tables>,
}

impl PeerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Register a newly seen peer.
    ///
    /// # Errors
    ///
    /// `RegistryError::AlreadyPresent` if the id is known; the registry is
    /// left unchanged.
    pub fn add(
        &self,
        handle: ModuleHandle,
        state: ModuleLifecycleState,
        additional_state: Vec<u8>,
    ) -> Result<(), RegistryError> {
        let id = handle.unique_id;
        let mut tables = self.tables.write();
        if tables.peers.contains_key(&id) {
            let err = RegistryError::AlreadyPresent(id);
            warn!("[Registry] {}", err);
            return Err(err);
        }

        info!("[Registry] Adding peer {} ({})", handle.describe(), state);
        tables.by_type.entry(id.type_id).or_default().push(id);
        tables.peers.insert(
            id,
            PeerEntry {
                handle,
                state,
                additional_state,
                silence: Duration::ZERO,
            },
        );
        tables.set_active(id, state.is_active());
        Ok(())
    }

    /// Remove a peer from every index, returning its last entry.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotFound` if the id is unknown.
    pub fn remove(&self, id: &ModuleUniqueId) -> Result<PeerEntry, RegistryError> {
        let mut tables = self.tables.write();
        let Some(entry) = tables.peers.remove(id) else {
            let err = RegistryError::NotFound(*id);
            warn!("[Registry] {}", err);
            return Err(err);
        };
        unindex(&mut tables.by_type, id);
        tables.set_active(*id, false);
        info!("[Registry] Removed peer {}", entry.handle.describe());
        Ok(entry)
    }

    /// Change a peer's state, keeping the active view consistent.
    ///
    /// Returns the previous state. Setting the current state is a no-op.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotFound` if the id is unknown.
    pub fn update_state(
        &self,
        id: &ModuleUniqueId,
        state: ModuleLifecycleState,
    ) -> Result<ModuleLifecycleState, RegistryError> {
        let mut tables = self.tables.write();
        let Some(entry) = tables.peers.get_mut(id) else {
            let err = RegistryError::NotFound(*id);
            warn!("[Registry] {}", err);
            return Err(err);
        };
        let previous = entry.state;
        if previous == state {
            return Ok(previous);
        }
        entry.state = state;
        tables.set_active(*id, state.is_active());
        info!("[Registry] Peer {} {} -> {}", id, previous, state);
        Ok(previous)
    }

    /// Replace a peer's additional state bytes.
    ///
    /// # Errors
    ///
    /// `RegistryError::NotFound` if the id is unknown.
    pub fn update_additional_state(
        &self,
        id: &ModuleUniqueId,
        additional_state: Vec<u8>,
    ) -> Result<(), RegistryError> {
        let mut tables = self.tables.write();
        match tables.peers.get_mut(id) {
            Some(entry) => {
                entry.additional_state = additional_state;
                Ok(())
            }
            None => Err(RegistryError::NotFound(*id)),
        }
    }

    /// Forget every peer.
    pub fn clear(&self) {
        let mut tables = self.tables.write();
        *tables = Tables::default();
        info!("[Registry] Cleared");
    }

    // =========================================================================
    // TIMEOUT BOOKKEEPING
    // =========================================================================

    /// A heartbeat arrived from `id`.
    pub(crate) fn reset_silence(&self, id: &ModuleUniqueId) {
        if let Some(entry) = self.tables.write().peers.get_mut(id) {
            entry.silence = Duration::ZERO;
        }
    }

    /// Advance every peer's silence by `step` and return the peers whose
    /// silence now exceeds `limit`.
    pub(crate) fn advance_silence(&self, step: Duration, limit: Duration) -> Vec<ModuleUniqueId> {
        let mut tables = self.tables.write();
        tables
            .peers
            .iter_mut()
            .filter_map(|(id, entry)| {
                entry.silence = entry.silence.saturating_add(step);
                (entry.silence > limit).then_some(*id)
            })
            .collect()
    }
}

impl PeerDirectory for PeerRegistry {
    fn contains(&self, id: &ModuleUniqueId, only_active: bool) -> bool {
        self.tables.read().visible(id, only_active).is_some()
    }

    fn get(&self, id: &ModuleUniqueId, only_active: bool) -> Option<ModuleHandle> {
        self.tables
            .read()
            .visible(id, only_active)
            .map(|e| e.handle.clone())
    }

    fn contains_type(&self, type_id: u16, only_active: bool) -> bool {
        self.tables.read().group(only_active).contains_key(&type_id)
    }

    fn list_by_type(&self, type_id: u16, only_active: bool) -> Vec<ModuleHandle> {
        self.tables
            .read()
            .of_type(type_id, only_active)
            .map(|e| e.handle.clone())
            .collect()
    }

    fn any_by_type(&self, type_id: u16, only_active: bool) -> Option<ModuleHandle> {
        self.tables
            .read()
            .of_type(type_id, only_active)
            .next()
            .map(|e| e.handle.clone())
    }

    fn contains_type_version(&self, type_id: u16, version: u16, only_active: bool) -> bool {
        self.tables
            .read()
            .of_type(type_id, only_active)
            .any(|e| e.handle.version == version)
    }

    fn list_by_type_version(&self, type_id: u16, version: u16, only_active: bool) -> Vec<ModuleHandle> {
        self.tables
            .read()
            .of_type(type_id, only_active)
            .filter(|e| e.handle.version == version)
            .map(|e| e.handle.clone())
            .collect()
    }

    fn any_by_type_version(&self, type_id: u16, version: u16, only_active: bool) -> Option<ModuleHandle> {
        self.tables
            .read()
            .of_type(type_id, only_active)
            .find(|e| e.handle.version == version)
            .map(|e| e.handle.clone())
    }

    fn state_of(&self, id: &ModuleUniqueId) -> ModuleLifecycleState {
        self.tables
            .read()
            .peers
            .get(id)
            .map_or(ModuleLifecycleState::Dead, |e| e.state)
    }

    fn additional_state_of(&self, id: &ModuleUniqueId) -> Option<Vec<u8>> {
        self.tables
            .read()
            .peers
            .get(id)
            .map(|e| e.additional_state.clone())
    }

    fn peers_snapshot(&self, only_active: bool) -> HashMap<ModuleUniqueId, ModuleHandle> {
        let tables = self.tables.read();
        tables
            .peers
            .iter()
            .filter(|(id, _)| !only_active || tables.active.contains(id))
            .map(|(id, e)| (*id, e.handle.clone()))
            .collect()
    }

    fn peers_by_type_snapshot(&self, only_active: bool) -> HashMap<u16, Vec<ModuleHandle>> {
        let tables = self.tables.read();
        tables
            .group(only_active)
            .keys()
            .map(|type_id| {
                let handles = tables
                    .of_type(*type_id, only_active)
                    .map(|e| e.handle.clone())
                    .collect();
                (*type_id, handles)
            })
            .collect()
    }

    fn peer_count(&self) -> usize {
        self.tables.read().peers.len()
    }

    fn active_peer_count(&self) -> usize {
        self.tables.read().active.len()
    }
}
