//! Manager-wide work dispatcher (§4.6): the ordered pre-mount / post-mount /
//! unmount / bulk-erase storage pipeline, driven by a single detached
//! worker thread with child-process timeout/cancel.

pub mod dispatcher;
pub mod protocol;
pub mod worker;

pub use dispatcher::{DispatchHandle, Dispatcher};
pub use protocol::ControlResponse;

#[cfg(test)]
mod tests {
    use super::*;
    use cm_config::host::{PipelineEntry, PipelinePhase, PipelineTaskType};
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    fn unmount_entry(mountpoint: &str) -> PipelineEntry {
        PipelineEntry {
            task_type: PipelineTaskType::Unmount,
            phase_mask: vec![PipelinePhase::Terminate],
            device_path: PathBuf::from("/dev/null"),
            mountpoint: Some(PathBuf::from(mountpoint)),
            fs_options: None,
            mount_flags: None,
        }
    }

    #[test]
    fn dispatcher_rejects_concurrent_phase() {
        let mut d = Dispatcher::new();
        let entries = vec![unmount_entry("/tmp/does-not-exist-cm-test")];
        let _fd = d.dispatch(PipelinePhase::Terminate, entries.clone()).unwrap();
        assert!(d.is_busy());
        let err = d.dispatch(PipelinePhase::Terminate, entries);
        assert!(err.is_err());

        // Drain the phase so the test doesn't leak a thread.
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Ok(Some(resp)) = d.recv() {
                if resp.operation == protocol::OP_PHASE_DONE {
                    break;
                }
            }
            if Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        d.finish();
        assert!(!d.is_busy());
    }

    #[test]
    fn cancel_closes_host_fd() {
        let mut d = Dispatcher::new();
        let entries = vec![unmount_entry("/tmp/does-not-exist-cm-test-2")];
        let _fd = d.dispatch(PipelinePhase::Terminate, entries).unwrap();
        d.cancel();
        d.finish();
        assert!(!d.is_busy());
    }
}
