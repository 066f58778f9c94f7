//! # Ordering & Backpressure
//!
//! Events from one source reach the subscriber in publish order. With a
//! bounded queue, `drop` sheds overflow while `block` holds producers back
//! and loses nothing.

#[cfg(test)]
mod tests {
    use std::thread;

    use module_runtime::ModuleInstance;
    use shared_types::{Message, ModuleUniqueId, StaticConfigProvider};

    use crate::harness::{topic, wait_until, Fabric, Journal, Observer, Scripted, INTERVAL};

    fn numbered(n: u32) -> Vec<u8> {
        n.to_be_bytes().to_vec()
    }

    fn decode(payloads: &[Vec<u8>]) -> Vec<u32> {
        payloads
            .iter()
            .filter_map(|p| <[u8; 4]>::try_from(p.as_slice()).ok())
            .map(u32::from_be_bytes)
            .collect()
    }

    /// Start a subscriber on `[7]` and a publisher, and wait until the
    /// subscriber has joined the publisher.
    fn pair(
        fabric: &Fabric,
        journal: &Journal,
        subscriber_config: StaticConfigProvider,
    ) -> anyhow::Result<(ModuleInstance, Observer, ModuleInstance, Observer)> {
        let (subscriber, sub_view) = Scripted::new(1, 0, journal);
        let subscriber = fabric.launch_with(
            subscriber.subscribes(topic(&[7])?),
            subscriber_config,
            Fabric::options(),
        )?;
        let (publisher, pub_view) = Scripted::new(2, 0, journal);
        let publisher = fabric.launch(publisher)?;

        assert!(wait_until(|| subscriber.is_module_active() && publisher.is_module_active()));
        assert!(wait_until(|| subscriber.peers().contains(&ModuleUniqueId::new(2, 0), true)));
        thread::sleep(INTERVAL);
        Ok((subscriber, sub_view, publisher, pub_view))
    }

    #[test]
    fn test_events_from_one_source_arrive_in_order() -> anyhow::Result<()> {
        let fabric = Fabric::new();
        let journal = Journal::default();
        let (subscriber, sub_view, publisher, pub_view) = pair(&fabric, &journal, StaticConfigProvider::new())?;

        let framework = pub_view.framework()?;
        for n in 0..300 {
            framework.publish(&Message::new(topic(&[7, 1])?, numbered(n)))?;
        }

        assert!(wait_until(|| sub_view.events.lock().len() == 300));
        assert_eq!(decode(&sub_view.event_payloads()), (0..300).collect::<Vec<_>>());
        assert!(sub_view
            .events
            .lock()
            .iter()
            .all(|(sender, _)| *sender == ModuleUniqueId::new(2, 0)));

        subscriber.stop_instance();
        publisher.stop_instance();
        Ok(())
    }

    #[test]
    fn test_overlapping_subscriptions_each_receive() -> anyhow::Result<()> {
        let fabric = Fabric::new();
        let journal = Journal::default();

        let (subscriber, sub_view) = Scripted::new(1, 0, &journal);
        let subscriber = fabric.launch(
            subscriber
                .subscribes(topic(&[7])?)
                .subscribes(topic(&[7, 1])?),
        )?;
        let (publisher, pub_view) = Scripted::new(2, 0, &journal);
        let publisher = fabric.launch(publisher)?;
        assert!(wait_until(|| subscriber.is_module_active() && publisher.is_module_active()));
        assert!(wait_until(|| subscriber.peers().contains(&ModuleUniqueId::new(2, 0), true)));
        thread::sleep(INTERVAL);

        let framework = pub_view.framework()?;
        framework.publish(&Message::new(topic(&[7, 1, 5])?, b"both".to_vec()))?;
        framework.publish(&Message::new(topic(&[7, 2])?, b"one".to_vec()))?;
        framework.publish(&Message::new(topic(&[6])?, b"none".to_vec()))?;

        assert!(wait_until(|| sub_view.events.lock().len() >= 3));
        thread::sleep(INTERVAL);
        assert_eq!(
            sub_view.event_payloads(),
            vec![b"both".to_vec(), b"both".to_vec(), b"one".to_vec()]
        );

        subscriber.stop_instance();
        publisher.stop_instance();
        Ok(())
    }

    #[test]
    fn test_drop_policy_sheds_overflow() -> anyhow::Result<()> {
        let fabric = Fabric::new();
        let journal = Journal::default();
        let config = StaticConfigProvider::new()
            .with("MF_INMSG_BUFFER_SIZE", 4)
            .with("MF_INMSG_BUFFER_MODE", "drop");
        let (subscriber, sub_view, publisher, pub_view) = pair(&fabric, &journal, config)?;

        let gate = sub_view.close_gate();
        let framework = pub_view.framework()?;
        for n in 0..50 {
            framework.publish(&Message::new(topic(&[7])?, numbered(n)))?;
        }
        let dispatcher = subscriber.dispatcher();
        assert!(wait_until(|| dispatcher.dropped_count() > 0));
        assert!(dispatcher.queue_len() <= 4);

        gate.release();
        assert!(wait_until(|| {
            sub_view.events.lock().len() as u64 + dispatcher.dropped_count() == 50
        }));
        let delivered = decode(&sub_view.event_payloads());
        assert!(delivered.len() < 50);
        assert!(delivered.windows(2).all(|w| w[0] < w[1]), "out of order: {delivered:?}");

        subscriber.stop_instance();
        publisher.stop_instance();
        Ok(())
    }

    #[test]
    fn test_block_policy_loses_nothing() -> anyhow::Result<()> {
        let fabric = Fabric::new();
        let journal = Journal::default();
        let config = StaticConfigProvider::new()
            .with("MF_INMSG_BUFFER_SIZE", 4)
            .with("MF_INMSG_BUFFER_MODE", "block")
            .with("MF_INMSG_BUFFER_BLOCK_WAIT_MS", 1);
        let (subscriber, sub_view, publisher, pub_view) = pair(&fabric, &journal, config)?;

        let gate = sub_view.close_gate();
        let framework = pub_view.framework()?;
        for n in 0..50 {
            framework.publish(&Message::new(topic(&[7])?, numbered(n)))?;
        }
        thread::sleep(INTERVAL * 2);
        let dispatcher = subscriber.dispatcher();
        assert!(dispatcher.queue_len() <= 4);
        assert_eq!(dispatcher.dropped_count(), 0);

        gate.release();
        assert!(wait_until(|| sub_view.events.lock().len() == 50));
        assert_eq!(decode(&sub_view.event_payloads()), (0..50).collect::<Vec<_>>());

        subscriber.stop_instance();
        publisher.stop_instance();
        Ok(())
    }
}
