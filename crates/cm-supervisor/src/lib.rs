//! Supervisor state machine (C7), event reactor (C1) and guest monitor (C9),
//! wired together with the device hot-plug engine (C4), the per-guest
//! workqueue (C5) and the manager-wide work dispatcher (C6).

pub mod ipc_handler;
pub mod pidfd;
pub mod reactor;
pub mod state;
pub mod supervisor;

pub use reactor::{spawn_workqueue_bridge, Reactor};
pub use state::{GuestStatus, SystemMode};
pub use supervisor::Supervisor;

#[cfg(test)]
mod tests {
    use super::*;
    use cm_config::host::{HostConfig, PipelinePhase, PipelineTaskType};
    use cm_config::Guest;
    use cm_runtime::{CgroupDeviceAction, ContainerHandle, ContainerRuntime, DeviceSpec};
    use cm_shared::{CmResult, GuestIndex, RoleName};
    use std::collections::HashMap;
    use std::os::fd::OwnedFd;

    struct FakeHandle {
        started: bool,
    }

    impl ContainerHandle for FakeHandle {
        fn start(&mut self) -> CmResult<()> {
            self.started = true;
            Ok(())
        }
        fn shutdown(&mut self) -> CmResult<()> {
            Ok(())
        }
        fn force_kill(&mut self) -> CmResult<()> {
            Ok(())
        }
        fn release(&mut self) -> CmResult<()> {
            Ok(())
        }
        fn set_cgroup_device(&mut self, _action: CgroupDeviceAction, _spec: &DeviceSpec) -> CmResult<()> {
            Ok(())
        }
        fn attach_netif(&mut self, _host_ifname: &str, _guest_ifname: &str) -> CmResult<()> {
            Ok(())
        }
        fn init_pid(&self) -> Option<i32> {
            Some(1234)
        }
        fn init_pidfd(&self) -> CmResult<OwnedFd> {
            Err(cm_shared::CmError::Invariant("no real process in tests".into()))
        }
    }

    struct FakeRuntime;

    impl ContainerRuntime for FakeRuntime {
        fn create_instance(&self, _guest: &Guest) -> CmResult<Box<dyn ContainerHandle>> {
            Ok(Box::new(FakeHandle { started: false }))
        }
    }

    fn guest(name: &str, role: &str, autoboot: bool, bootpriority: i32) -> Guest {
        serde_json::from_str(&format!(
            r#"{{
                "name": "{name}",
                "role": "{role}",
                "base": {{
                    "autoboot": {autoboot},
                    "bootpriority": {bootpriority},
                    "rootfs": {{
                        "path": "/var/lib/cm/{name}/rootfs",
                        "fstype": "ext4",
                        "mode": "rw",
                        "blockdev": ["/dev/disk/by-partlabel/{name}-a", ""]
                    }}
                }}
            }}"#
        ))
        .unwrap()
    }

    fn fixture() -> Supervisor<FakeRuntime> {
        let guests = vec![
            guest("primary", "ivi", true, 1),
            guest("fallback", "ivi", false, 2),
        ];
        let roles = cm_config::build_role_table(&guests);
        let host_config = HostConfig {
            config_dir: "/etc/cm".into(),
            bridges: vec![],
            pipeline: vec![],
        };
        let (tx, _rx) = std::sync::mpsc::channel();
        Supervisor::new(guests, roles, host_config, FakeRuntime, "/usr/bin/cm-daemon".into(), tx)
    }

    #[test]
    fn boot_promotes_autoboot_head_on_first_tick() {
        let mut sv = fixture();
        sv.boot();
        let outcome = sv.tick(std::time::Instant::now());
        assert_eq!(outcome.newly_started, vec![GuestIndex(0)]);
        assert_eq!(sv.status(GuestIndex(0)), GuestStatus::Started);
        assert_eq!(sv.status(GuestIndex(1)), GuestStatus::Disable);
    }

    #[test]
    fn change_active_demotes_old_head_and_promotes_fallback_without_an_exit() {
        let mut sv = fixture();
        sv.boot();
        sv.tick(std::time::Instant::now());
        assert_eq!(sv.status(GuestIndex(0)), GuestStatus::Started);

        assert_eq!(sv.change_active_by_name("fallback"), cm_ipc::wire::CHANGE_ACCEPT);

        // No exit event at all: the next tick alone must demote the old
        // head to DISABLE+cleanup and promote the new one, per spec.md §8
        // scenario 4. Both guests are never STARTED in the same tick.
        let outcome = sv.tick(std::time::Instant::now());
        assert_eq!(outcome.newly_started, vec![GuestIndex(1)]);
        assert_eq!(sv.status(GuestIndex(0)), GuestStatus::Disable);
        assert_eq!(sv.status(GuestIndex(1)), GuestStatus::Started);
    }

    #[test]
    fn unknown_guest_name_is_rejected() {
        let mut sv = fixture();
        assert_eq!(
            sv.request_lifecycle_by_name("does-not-exist", cm_ipc::wire::SUB_SHUTDOWN),
            cm_ipc::wire::LIFECYCLE_NONAME
        );
        assert_eq!(sv.change_active_by_name("does-not-exist"), cm_ipc::wire::CHANGE_NONAME);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let mut sv = fixture();
        assert_eq!(
            sv.request_lifecycle_by_role("no-such-role", cm_ipc::wire::SUB_SHUTDOWN),
            cm_ipc::wire::LIFECYCLE_NOROLE
        );
    }

    #[test]
    fn system_shutdown_moves_idle_guests_straight_to_exit() {
        let mut sv = fixture();
        sv.boot();
        sv.request_system_shutdown();
        assert_eq!(sv.mode(), SystemMode::Shutdown);
        // Neither guest was ticked into STARTED, so shutdown moves it
        // straight from NOT_STARTED to EXIT without a halt/timeout wait.
        assert_eq!(sv.status(GuestIndex(1)), GuestStatus::Exit);
    }

    #[test]
    fn guest_list_reports_wire_status_codes() {
        let mut sv = fixture();
        sv.boot();
        sv.tick(std::time::Instant::now());
        let list = sv.guest_list();
        let primary = list.iter().find(|g| g.name == "primary").unwrap();
        assert_eq!(primary.status, cm_ipc::wire::GUEST_STATUS_STARTED);
        let fallback = list.iter().find(|g| g.name == "fallback").unwrap();
        assert_eq!(fallback.status, cm_ipc::wire::GUEST_STATUS_DISABLE);
    }

    #[test]
    fn role_table_has_single_entry_per_role() {
        let sv = fixture();
        let mut seen: HashMap<RoleName, usize> = HashMap::new();
        for i in 0..sv.guest_count() {
            *seen.entry(RoleName::from(sv.guest(GuestIndex(i)).role.as_str())).or_default() += 1;
        }
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn host_config_pipeline_phase_filters_by_mask() {
        let entry = cm_config::host::PipelineEntry {
            task_type: PipelineTaskType::Mount,
            phase_mask: vec![PipelinePhase::Start],
            device_path: "/dev/mmcblk0p1".into(),
            mountpoint: Some("/var/nv1".into()),
            fs_options: None,
            mount_flags: None,
        };
        assert!(entry.runs_in(PipelinePhase::Start));
        assert!(!entry.runs_in(PipelinePhase::Terminate));
    }
}
