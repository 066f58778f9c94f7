//! # Identity Uniqueness
//!
//! At most one instance per `(type, instance)` pair may be active. A
//! duplicate stays inactive while the original is active; two duplicates
//! that activate together stop once they see each other.

#[cfg(test)]
mod tests {
    use std::thread;

    use shared_types::ModuleUniqueId;

    use crate::harness::{wait_until, Fabric, Journal, Scripted, INTERVAL};

    #[test]
    fn test_duplicate_waits_for_original() -> anyhow::Result<()> {
        let fabric = Fabric::new();
        let journal = Journal::default();
        let id = ModuleUniqueId::new(5, 0);

        let (original, _) = Scripted::new(5, 0, &journal);
        let original = fabric.launch(original)?;
        assert!(wait_until(|| original.is_module_active()));

        let (duplicate, _) = Scripted::new(5, 0, &journal);
        let duplicate = fabric.launch(duplicate)?;
        assert!(wait_until(|| duplicate.peers().contains(&id, true)));
        thread::sleep(INTERVAL * 3);
        assert!(!duplicate.is_module_active());
        assert!(original.is_module_active());
        assert_eq!(journal.count("enable 5:0"), 1);

        original.stop_instance();
        assert!(wait_until(|| duplicate.is_module_active()));
        assert_eq!(journal.count("enable 5:0"), 2);

        duplicate.stop_instance();
        Ok(())
    }

    #[test]
    fn test_instances_of_one_type_coexist() -> anyhow::Result<()> {
        let fabric = Fabric::new();
        let journal = Journal::default();

        let (first, _) = Scripted::new(5, 0, &journal);
        let first = fabric.launch(first)?;
        let (second, _) = Scripted::new(5, 1, &journal);
        let second = fabric.launch(second)?;

        assert!(wait_until(|| first.is_module_active() && second.is_module_active()));
        assert!(wait_until(|| first.peers().contains(&ModuleUniqueId::new(5, 1), true)));
        thread::sleep(INTERVAL * 3);
        assert!(first.is_module_active() && second.is_module_active());

        first.stop_instance();
        second.stop_instance();
        Ok(())
    }

    #[test]
    fn test_simultaneous_duplicates_do_not_both_stay_active() -> anyhow::Result<()> {
        let fabric = Fabric::new();
        let journal = Journal::default();
        let options = Fabric::options().with_auto_enable(false);

        let (left, _) = Scripted::new(5, 0, &journal);
        let left = fabric.launch_with(left, Default::default(), options)?;
        let (right, _) = Scripted::new(5, 0, &journal);
        let right = fabric.launch_with(right, Default::default(), options)?;
        assert!(wait_until(|| left.peers().contains(&ModuleUniqueId::new(5, 0), false)));

        left.request_enable_module();
        right.request_enable_module();

        thread::sleep(INTERVAL * 10);
        assert!(wait_until(|| !(left.is_module_active() && right.is_module_active())));
        thread::sleep(INTERVAL * 5);
        assert!(!(left.is_module_active() && right.is_module_active()));

        left.stop_instance();
        right.stop_instance();
        Ok(())
    }
}
