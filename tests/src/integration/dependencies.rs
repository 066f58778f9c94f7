//! # Dependency Gating
//!
//! A chain `1 -> 2 -> 3` (type 1 depends on type 2, which depends on type
//! 3) enables bottom-up once every link is present, and tears down top-down
//! when the bottom disappears.

#[cfg(test)]
mod tests {
    use std::thread;

    use shared_types::ModuleDependency;

    use crate::harness::{wait_until, Fabric, Journal, Scripted, INTERVAL};

    #[test]
    fn test_chain_enables_bottom_up() -> anyhow::Result<()> {
        let fabric = Fabric::new();
        let journal = Journal::default();

        let (top, _) = Scripted::new(1, 0, &journal);
        let top = fabric.launch(top.depends_on(ModuleDependency::on_type(2)))?;
        let (middle, _) = Scripted::new(2, 0, &journal);
        let middle = fabric.launch(middle.depends_on(ModuleDependency::on_type(3)))?;

        thread::sleep(INTERVAL * 3);
        assert!(!top.is_module_active());
        assert!(!middle.is_module_active());

        let (bottom, _) = Scripted::new(3, 0, &journal);
        let bottom = fabric.launch(bottom)?;

        assert!(wait_until(|| top.is_module_active()));
        let bottom_at = journal.position("enable 3:0").unwrap_or(usize::MAX);
        let middle_at = journal.position("enable 2:0").unwrap_or(usize::MAX);
        let top_at = journal.position("enable 1:0").unwrap_or(usize::MAX);
        assert!(bottom_at < middle_at, "journal: {:?}", journal.entries());
        assert!(middle_at < top_at, "journal: {:?}", journal.entries());

        top.stop_instance();
        middle.stop_instance();
        bottom.stop_instance();
        Ok(())
    }

    #[test]
    fn test_losing_the_bottom_cascades_and_recovers() -> anyhow::Result<()> {
        let fabric = Fabric::new();
        let journal = Journal::default();

        let (bottom, _) = Scripted::new(3, 0, &journal);
        let bottom = fabric.launch(bottom)?;
        let (middle, _) = Scripted::new(2, 0, &journal);
        let middle = fabric.launch(middle.depends_on(ModuleDependency::on_type(3)))?;
        let (top, _) = Scripted::new(1, 0, &journal);
        let top = fabric.launch(top.depends_on(ModuleDependency::on_type(2)))?;
        assert!(wait_until(|| top.is_module_active()));

        bottom.stop_instance();
        assert!(wait_until(|| !middle.is_module_active()));
        assert!(wait_until(|| !top.is_module_active()));
        assert!(middle.is_started());
        assert!(top.is_started());

        let (replacement, _) = Scripted::new(3, 1, &journal);
        let replacement = fabric.launch(replacement)?;
        assert!(wait_until(|| middle.is_module_active() && top.is_module_active()));
        assert_eq!(journal.count("enable 1:0"), 2);
        assert_eq!(journal.count("disable 1:0"), 1);

        top.stop_instance();
        middle.stop_instance();
        replacement.stop_instance();
        Ok(())
    }

    #[test]
    fn test_any_instance_of_the_type_satisfies() -> anyhow::Result<()> {
        let fabric = Fabric::new();
        let journal = Journal::default();

        let (first, _) = Scripted::new(2, 0, &journal);
        let first = fabric.launch(first)?;
        let (second, _) = Scripted::new(2, 1, &journal);
        let second = fabric.launch(second)?;
        let (consumer, _) = Scripted::new(1, 0, &journal);
        let consumer = fabric.launch(consumer.depends_on(ModuleDependency::on_type(2)))?;
        assert!(wait_until(|| consumer.is_module_active()));

        first.stop_instance();
        assert!(wait_until(|| consumer.peers().list_by_type(2, true).len() == 1));
        thread::sleep(INTERVAL * 3);
        assert!(consumer.is_module_active());
        assert_eq!(journal.count("disable 1:0"), 0);

        consumer.stop_instance();
        second.stop_instance();
        Ok(())
    }
}
