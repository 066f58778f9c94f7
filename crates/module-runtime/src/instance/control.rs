//! Instance control flags and the coordinator wakeup channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mf_01_peer_discovery::PeerStateListener;
use mf_02_event_dispatch::{EventDispatcher, LifecycleControl};
use parking_lot::Mutex;
use shared_types::{ModuleHandle, ModuleLifecycleState};
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Flags shared between the public API, remote system messages and the
/// coordinator loop.
pub(crate) struct InstanceControl {
    pub(crate) started: AtomicBool,
    pub(crate) stopped: AtomicBool,
    pub(crate) module_active: AtomicBool,
    pub(crate) stop_requested: AtomicBool,
    pub(crate) disable_requested: AtomicBool,
    pub(crate) enable_requested: AtomicBool,
    wake_tx: mpsc::Sender<()>,
    wake_rx: Mutex<mpsc::Receiver<()>>,
}

impl InstanceControl {
    pub(crate) fn new() -> Self {
        // Capacity 1: wakeups coalesce while the loop is busy.
        let (wake_tx, wake_rx) = mpsc::channel(1);
        Self {
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(true),
            module_active: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            disable_requested: AtomicBool::new(false),
            enable_requested: AtomicBool::new(false),
            wake_tx,
            wake_rx: Mutex::new(wake_rx),
        }
    }

    pub(crate) fn wake(&self) {
        // A full channel already holds a pending wakeup.
        let _ = self.wake_tx.try_send(());
    }

    /// Block the coordinator until the next wakeup.
    pub(crate) fn wait_for_wake(&self) {
        let mut rx = self.wake_rx.lock();
        let _ = rx.blocking_recv();
    }

    pub(crate) fn is(&self, flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self, flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    /// Clear `flag`, returning whether it was set.
    pub(crate) fn take(&self, flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::SeqCst)
    }
}

impl LifecycleControl for InstanceControl {
    fn request_enable_module(&self) {
        if self.is(&self.module_active) {
            warn!("Enable requested but module already enabled, ignoring");
            return;
        }
        self.set(&self.disable_requested, false);
        self.set(&self.enable_requested, true);
        self.wake();
        trace!("Enable requested");
    }

    fn request_disable_module(&self) {
        if !self.is(&self.module_active) && !self.is(&self.enable_requested) {
            warn!("Disable requested but module not enabled, ignoring");
            return;
        }
        self.set(&self.enable_requested, false);
        self.set(&self.disable_requested, true);
        self.wake();
        trace!("Disable requested");
    }

    fn request_stop_instance(&self) {
        if !self.is(&self.started) && !self.is(&self.enable_requested) {
            warn!("Stop requested but instance not started, ignoring");
            return;
        }
        self.set(&self.enable_requested, false);
        self.set(&self.stop_requested, true);
        self.wake();
        trace!("Stop requested");
    }
}

/// Routes discovery's peer transitions to the dispatcher and wakes the
/// coordinator to re-check its preconditions.
pub(crate) struct PeerChangeRouter {
    pub(crate) dispatcher: Arc<EventDispatcher>,
    pub(crate) control: Arc<InstanceControl>,
}

impl PeerStateListener for PeerChangeRouter {
    fn on_peer_state_change(
        &self,
        peer: &ModuleHandle,
        new_state: ModuleLifecycleState,
        last_state: ModuleLifecycleState,
    ) {
        self.control.wake();
        self.dispatcher.on_peer_state_change(peer, new_state, last_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wakeups_coalesce() {
        let control = InstanceControl::new();
        control.wake();
        control.wake();
        control.wake();
        control.wait_for_wake();
        assert!(control.wake_rx.lock().try_recv().is_err());
    }

    #[test]
    fn test_disable_ignored_when_idle() {
        let control = InstanceControl::new();
        control.request_disable_module();
        assert!(!control.is(&control.disable_requested));

        control.request_enable_module();
        assert!(control.is(&control.enable_requested));
        control.request_disable_module();
        assert!(control.is(&control.disable_requested));
        assert!(!control.is(&control.enable_requested));
    }

    #[test]
    fn test_stop_clears_pending_enable() {
        let control = InstanceControl::new();
        control.set(&control.started, true);
        control.request_enable_module();
        control.request_stop_instance();
        assert!(control.is(&control.stop_requested));
        assert!(!control.is(&control.enable_requested));
    }

    #[test]
    fn test_enable_ignored_when_active() {
        let control = InstanceControl::new();
        control.set(&control.module_active, true);
        control.request_enable_module();
        assert!(!control.is(&control.enable_requested));
    }
}
