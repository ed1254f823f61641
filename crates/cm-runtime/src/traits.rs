//! Runtime engine seam (§4.3): `ContainerRuntime` builds instances,
//! `ContainerHandle` operates on one running instance. Mirrors the
//! teacher's `VmmController` / `VmmHandler` split so spawn-time and
//! runtime-time operations stay on separate traits.

use crate::devspec::{CgroupDeviceAction, DeviceSpec};
use cm_config::Guest;
use cm_shared::CmResult;
use std::os::fd::OwnedFd;

pub trait ContainerRuntime: Send {
    /// Materialises `guest`'s config into a runtime instance. On success the
    /// returned handle has *not* been started yet. Any failure here leaves
    /// no instance behind — callers never see a partially configured guest.
    fn create_instance(&self, guest: &Guest) -> CmResult<Box<dyn ContainerHandle>>;
}

pub trait ContainerHandle: Send {
    fn start(&mut self) -> CmResult<()>;

    /// Non-blocking: sends the configured halt signal and returns
    /// immediately. The caller tracks the shutdown deadline itself.
    fn shutdown(&mut self) -> CmResult<()>;

    /// SIGKILL to the guest's init pid.
    fn force_kill(&mut self) -> CmResult<()>;

    fn release(&mut self) -> CmResult<()>;

    fn set_cgroup_device(&mut self, action: CgroupDeviceAction, spec: &DeviceSpec) -> CmResult<()>;

    fn attach_netif(&mut self, host_ifname: &str, guest_ifname: &str) -> CmResult<()>;

    fn init_pid(&self) -> Option<i32>;

    /// Opens a `pidfd` for the guest's init process so the reactor (C1/C9)
    /// can watch it without racing on pid reuse.
    fn init_pidfd(&self) -> CmResult<OwnedFd>;
}
