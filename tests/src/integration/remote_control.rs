//! # Remote Lifecycle Control
//!
//! Instances drive each other through the reserved system request topic.
//! Acknowledgements come back before the requested transition runs.

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use mf_02_event_dispatch::system::UNKNOWN_SYSTEM_MESSAGE;
    use mf_02_event_dispatch::{SystemCommand, SYSTEM_REPLY_TOPIC, SYSTEM_REQUEST_TOPIC};
    use shared_types::{Message, ModuleDependency, ModuleUniqueId};

    use crate::harness::{topic, wait_until, Fabric, Journal, Scripted, INTERVAL};

    const ACK_TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn test_remote_stop_cascades_to_dependants() -> anyhow::Result<()> {
        let fabric = Fabric::new();
        let journal = Journal::default();

        let (provider, _) = Scripted::new(2, 0, &journal);
        let provider = fabric.launch(provider)?;
        let (dependant, _) = Scripted::new(3, 0, &journal);
        let dependant = fabric.launch(dependant.depends_on(ModuleDependency::on_type(2)))?;
        let (operator, operator_view) = Scripted::new(1, 0, &journal);
        let operator = fabric.launch(operator)?;

        let provider_id = ModuleUniqueId::new(2, 0);
        assert!(wait_until(|| operator.is_module_active() && dependant.is_module_active()));
        assert!(wait_until(|| operator.peers().contains(&provider_id, true)));
        thread::sleep(INTERVAL);

        let framework = operator_view.framework()?;
        assert!(framework.request_stop_remote_instance(provider_id, ACK_TIMEOUT));
        provider.join_execution();
        assert!(provider.is_stopped());
        assert!(wait_until(|| !dependant.is_module_active()));

        // Stopped peers cannot acknowledge.
        assert!(!framework.request_enable_remote_instance(provider_id, Duration::from_millis(200)));

        operator.stop_instance();
        dependant.stop_instance();
        Ok(())
    }

    #[test]
    fn test_remote_disable_keeps_instance_running() -> anyhow::Result<()> {
        let fabric = Fabric::new();
        let journal = Journal::default();
        let (target, _) = Scripted::new(2, 0, &journal);
        let target = fabric.launch(target)?;
        let (operator, operator_view) = Scripted::new(1, 0, &journal);
        let operator = fabric.launch(operator)?;

        let target_id = ModuleUniqueId::new(2, 0);
        assert!(wait_until(|| operator.is_module_active() && target.is_module_active()));
        assert!(wait_until(|| operator.peers().contains(&target_id, true)));
        thread::sleep(INTERVAL);
        let framework = operator_view.framework()?;

        assert!(framework.request_disable_remote_instance(target_id, ACK_TIMEOUT));
        assert!(wait_until(|| !operator.peers().contains(&target_id, true)));
        assert!(target.is_started());
        assert!(operator.peers().contains(&target_id, false));

        assert!(framework.request_enable_remote_instance(target_id, ACK_TIMEOUT));
        assert!(wait_until(|| operator.peers().contains(&target_id, true)));
        assert_eq!(journal.count("enable 2:0"), 2);

        operator.stop_instance();
        target.stop_instance();
        Ok(())
    }

    #[test]
    fn test_unknown_system_code_is_answered() -> anyhow::Result<()> {
        let fabric = Fabric::new();
        let journal = Journal::default();
        let (target, _) = Scripted::new(2, 0, &journal);
        let target = fabric.launch(target)?;
        let (operator, _) = Scripted::new(1, 0, &journal);
        let operator = fabric.launch(operator)?;

        let target_id = ModuleUniqueId::new(2, 0);
        assert!(wait_until(|| operator.is_module_active()));
        assert!(wait_until(|| operator.peers().contains(&target_id, false)));
        thread::sleep(INTERVAL);
        let handle = operator
            .peers()
            .get(&target_id, false)
            .ok_or_else(|| anyhow::anyhow!("target not discovered"))?;

        let request = Message::new(topic(&SYSTEM_REQUEST_TOPIC)?, vec![0x7F]);
        let reply = operator
            .dispatcher()
            .send_request(&handle, request)?
            .get_timeout(ACK_TIMEOUT)?;
        assert_eq!(reply.topic, topic(&SYSTEM_REPLY_TOPIC)?);
        assert_eq!(reply.payload, UNKNOWN_SYSTEM_MESSAGE.to_vec());
        assert!(!SystemCommand::Stop.is_acked_by(&reply));
        assert!(target.is_started());

        operator.stop_instance();
        target.stop_instance();
        Ok(())
    }
}
