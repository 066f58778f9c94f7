//! # Peer Timeout
//!
//! Peers that vanish without a `Dead` heartbeat are declared dead after
//! `PEER_TIMEOUT_FACTOR` silent intervals. The phantom peers here exist
//! only as injected heartbeat frames.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use mf_01_peer_discovery::PEER_TIMEOUT_FACTOR;
    use shared_types::{ModuleDependency, ModuleLifecycleState};

    use crate::harness::{phantom, wait_until, Fabric, Journal, Scripted, INTERVAL};

    /// Keep a phantom peer alive until the returned flag is cleared.
    fn keep_alive(fabric: &Arc<Fabric>, type_id: u16) -> (Arc<AtomicBool>, thread::JoinHandle<()>) {
        let running = Arc::new(AtomicBool::new(true));
        let handle = {
            let fabric = Arc::clone(fabric);
            let running = Arc::clone(&running);
            thread::spawn(move || {
                let peer = phantom(type_id, 0);
                while running.load(Ordering::SeqCst) {
                    let _ = fabric.inject(&peer, ModuleLifecycleState::Active);
                    thread::sleep(INTERVAL);
                }
            })
        };
        (running, handle)
    }

    #[test]
    fn test_silent_dependency_disables_dependant() -> anyhow::Result<()> {
        let fabric = Arc::new(Fabric::new());
        let journal = Journal::default();
        let (running, pulse) = keep_alive(&fabric, 9);

        let (consumer, _) = Scripted::new(1, 0, &journal);
        let consumer = fabric.launch(consumer.depends_on(ModuleDependency::on_type(9)))?;
        assert!(wait_until(|| consumer.is_module_active()));

        running.store(false, Ordering::SeqCst);
        let _ = pulse.join();
        let silenced = Instant::now();

        assert!(wait_until(|| !consumer.is_module_active()));
        let elapsed = silenced.elapsed();
        assert!(
            elapsed >= INTERVAL * (PEER_TIMEOUT_FACTOR - 2),
            "declared dead too early: {elapsed:?}"
        );
        assert!(!consumer.peers().contains(&phantom(9, 0).unique_id, false));
        assert_eq!(journal.count("disable 1:0"), 1);

        consumer.stop_instance();
        Ok(())
    }

    #[test]
    fn test_heartbeats_keep_peer_alive() -> anyhow::Result<()> {
        let fabric = Arc::new(Fabric::new());
        let journal = Journal::default();
        let (running, pulse) = keep_alive(&fabric, 9);

        let (consumer, _) = Scripted::new(1, 0, &journal);
        let consumer = fabric.launch(consumer.depends_on(ModuleDependency::on_type(9)))?;
        assert!(wait_until(|| consumer.is_module_active()));

        thread::sleep(INTERVAL * (PEER_TIMEOUT_FACTOR * 3));
        assert!(consumer.is_module_active());
        assert_eq!(journal.count("disable 1:0"), 0);

        running.store(false, Ordering::SeqCst);
        let _ = pulse.join();
        consumer.stop_instance();
        Ok(())
    }

    #[test]
    fn test_inactive_phantom_does_not_satisfy() -> anyhow::Result<()> {
        let fabric = Fabric::new();
        let journal = Journal::default();
        let (consumer, _) = Scripted::new(1, 0, &journal);
        let consumer = fabric.launch(consumer.depends_on(ModuleDependency::on_type(9)))?;

        let peer = phantom(9, 0);
        fabric.inject(&peer, ModuleLifecycleState::Inactive)?;
        assert!(wait_until(|| consumer.peers().contains(&peer.unique_id, false)));
        thread::sleep(Duration::from_millis(50));
        assert!(!consumer.is_module_active());

        fabric.inject(&peer, ModuleLifecycleState::Active)?;
        assert!(wait_until(|| consumer.is_module_active()));

        fabric.inject(&peer, ModuleLifecycleState::Dead)?;
        assert!(wait_until(|| !consumer.is_module_active()));

        consumer.stop_instance();
        Ok(())
    }
}
