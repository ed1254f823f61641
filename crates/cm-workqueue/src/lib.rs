//! Per-guest workqueue (§4.5): a state machine per guest slot plus a
//! compile-time registry of worker plugins (`fsck`, `erase`).

pub mod plugin;
pub mod plugins;
pub mod slot;

pub use plugin::{lookup, registered_names, PluginFactory, WorkerPlugin};
pub use slot::{PostExecuteAction, WorkqueueCompletion, WorkqueueSlot, WorkqueueStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use cm_shared::GuestIndex;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn fsck_and_erase_plugins_are_registered() {
        let names = registered_names();
        assert!(names.contains(&"fsck"));
        assert!(names.contains(&"erase"));
    }

    #[test]
    fn cannot_reschedule_while_running() {
        let mut slot = WorkqueueSlot::new(GuestIndex(0));
        let worker = slot
            .schedule("fsck", "/dev/null", PostExecuteAction::Hold)
            .unwrap();
        let (tx, _rx) = channel();
        slot.run(worker, tx);
        // give the worker thread a moment to flip status to Started
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(slot.status(), WorkqueueStatus::Started);
        let err = slot.schedule("fsck", "/dev/null", PostExecuteAction::Hold);
        assert!(err.is_err());
        slot.cancel();
    }

    #[test]
    fn unknown_plugin_name_is_not_found() {
        let mut slot = WorkqueueSlot::new(GuestIndex(0));
        let err = slot.schedule("does-not-exist", "", PostExecuteAction::Hold);
        assert!(err.is_err());
    }

    #[test]
    fn cleanup_returns_completed_slot_to_inactive() {
        let mut slot = WorkqueueSlot::new(GuestIndex(0));
        slot.complete(Ok(()));
        assert_eq!(slot.status(), WorkqueueStatus::Completed);
        slot.cleanup();
        assert_eq!(slot.status(), WorkqueueStatus::Inactive);
        // a cleaned-up slot can be scheduled again
        assert!(slot.schedule("fsck", "/dev/null", PostExecuteAction::Hold).is_ok());
    }

    #[test]
    fn remove_is_a_no_op_while_started() {
        let mut slot = WorkqueueSlot::new(GuestIndex(0));
        let worker = slot.schedule("fsck", "/dev/null", PostExecuteAction::Hold).unwrap();
        let (tx, _rx) = channel();
        slot.run(worker, tx);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(slot.status(), WorkqueueStatus::Started);
        slot.remove();
        assert_eq!(slot.status(), WorkqueueStatus::Started);
        slot.cancel();
    }
}
