//! Send and receive loops.

use std::sync::Arc;

use shared_types::ModuleLifecycleState;
use tracing::{debug, info, trace, warn};

use crate::domain::HeartbeatFrame;
use crate::ports::PeerDirectory;
use crate::service::core::{DiscoveryInner, Session};

/// Heartbeat, then sweep silent peers, then sleep one interval.
pub(crate) fn run_send_loop(inner: Arc<DiscoveryInner>, session: Arc<Session>) {
    let interval = session.config.broadcast_interval;
    let timeout = session.config.peer_timeout();
    loop {
        inner.broadcast();
        sweep_silent_peers(&inner, &session, interval, timeout);
        if inner.stop.wait_timeout(interval) {
            break;
        }
    }
    trace!("Discovery send loop exited");
}

fn sweep_silent_peers(
    inner: &DiscoveryInner,
    session: &Session,
    step: std::time::Duration,
    timeout: std::time::Duration,
) {
    let _membership = inner.membership.lock();
    for id in inner.registry.advance_silence(step, timeout) {
        if let Ok(entry) = inner.registry.remove(&id) {
            info!(peer = %id, last_state = %entry.state, "Peer timed out");
            session.notify(&entry.handle, ModuleLifecycleState::Dead, entry.state);
        }
    }
}

/// Block on the transport, ingesting heartbeats until stopped.
pub(crate) fn run_receive_loop(inner: Arc<DiscoveryInner>, session: Arc<Session>) {
    let interval = session.config.broadcast_interval;
    while !inner.stop.is_signalled() {
        match inner.transport.recv(interval) {
            Ok(Some(bytes)) => ingest(&inner, &session, &bytes),
            Ok(None) => {}
            Err(e) => {
                if inner.stop.is_signalled() {
                    break;
                }
                warn!(error = %e, "Heartbeat receive failed");
                if inner.stop.wait_timeout(interval) {
                    break;
                }
            }
        }
    }
    trace!("Discovery receive loop exited");
}

pub(crate) fn ingest(inner: &DiscoveryInner, session: &Session, bytes: &[u8]) {
    let frame = match HeartbeatFrame::decode(bytes) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "Dropping malformed heartbeat");
            return;
        }
    };
    let state = match frame.lifecycle_state() {
        Ok(state) => state,
        Err(e) => {
            debug!(peer = %frame.handle.unique_id, error = %e, "Dropping heartbeat");
            return;
        }
    };

    let sender = frame.handle.unique_id;
    if sender == session.self_id && frame.nonce == inner.nonce {
        return;
    }
    if session.config.exclude_same_type && sender.type_id == session.self_id.type_id {
        return;
    }

    let registry = &inner.registry;
    let _membership = inner.membership.lock();
    let known_state = registry.state_of(&sender);

    if state == ModuleLifecycleState::Dead {
        if known_state != ModuleLifecycleState::Dead {
            if let Ok(entry) = registry.remove(&sender) {
                session.notify(&entry.handle, ModuleLifecycleState::Dead, entry.state);
            }
        }
        return;
    }

    if known_state == ModuleLifecycleState::Dead {
        let handle = frame.handle.clone();
        if registry.add(frame.handle, state, frame.additional_state).is_ok() {
            session.notify(&handle, state, ModuleLifecycleState::Dead);
        }
        return;
    }

    registry.reset_silence(&sender);
    let _ = registry.update_additional_state(&sender, frame.additional_state);
    if known_state != state {
        if let Ok(last) = registry.update_state(&sender, state) {
            let handle = registry.get(&sender, false).unwrap_or(frame.handle);
            session.notify(&handle, state, last);
        }
    }
}
