//! Commits a matched device rule's behavior (§4.4 step 4) against a running
//! guest's cgroup device list.

use crate::uevent::UeventMessage;
use cm_config::guest::device::DeviceBehavior;
use cm_runtime::{CgroupDeviceAction, ContainerHandle, DevKind, DeviceSpec};
use cm_shared::CmResult;

pub fn commit_cgroup(
    handle: &mut dyn ContainerHandle,
    behavior: &DeviceBehavior,
    uevent: &UeventMessage,
) -> CmResult<()> {
    if !behavior.allow_via_cgroup {
        return Ok(());
    }
    let (Some(major), Some(minor)) = (uevent.major, uevent.minor) else {
        return Ok(());
    };
    let kind = DevKind::from_subsystem(uevent.subsystem.as_deref().unwrap_or(""));
    let spec = DeviceSpec::new(kind, major, Some(minor), behavior.permission.clone());
    let action = match uevent.action.as_str() {
        "remove" => CgroupDeviceAction::Deny,
        _ => CgroupDeviceAction::Allow,
    };
    handle.set_cgroup_device(action, &spec)
}
