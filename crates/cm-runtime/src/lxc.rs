//! `liblxc`-backed implementation of [`ContainerRuntime`]/[`ContainerHandle`].

use crate::config_render;
use crate::devspec::{CgroupDeviceAction, DeviceSpec};
use crate::traits::{ContainerHandle, ContainerRuntime};
use cm_config::Guest;
use cm_shared::{CmError, CmResult};
use std::ffi::CString;
use std::fs;
use std::os::fd::{FromRawFd, OwnedFd};
use std::path::PathBuf;
use std::ptr::NonNull;

/// Where per-guest generated lxc config files and lxc's own runtime state
/// directory live.
pub struct LxcRuntime {
    pub state_dir: PathBuf,
}

impl LxcRuntime {
    pub fn new(state_dir: PathBuf) -> Self {
        LxcRuntime { state_dir }
    }

    fn config_path(&self, guest_name: &str) -> PathBuf {
        self.state_dir.join(guest_name).join("config")
    }
}

impl ContainerRuntime for LxcRuntime {
    fn create_instance(&self, guest: &Guest) -> CmResult<Box<dyn ContainerHandle>> {
        let guest_dir = self.state_dir.join(&guest.name);
        fs::create_dir_all(&guest_dir).map_err(|e| {
            CmError::runtime(&guest.name, format!("failed to create state dir: {e}"))
        })?;

        let config_path = self.config_path(&guest.name);
        fs::write(&config_path, config_render::render(guest)).map_err(|e| {
            CmError::runtime(&guest.name, format!("failed to write lxc config: {e}"))
        })?;

        let name = CString::new(guest.name.as_str())
            .map_err(|_| CmError::runtime(&guest.name, "guest name contains a NUL byte"))?;
        let state_dir_c = CString::new(self.state_dir.as_os_str().to_string_lossy().as_ref())
            .map_err(|_| CmError::runtime(&guest.name, "state dir path contains a NUL byte"))?;

        // SAFETY: `lxc_container_new` takes two NUL-terminated C strings and
        // returns either NULL or a valid, refcounted `lxc_container*` this
        // call takes one reference to.
        let raw = unsafe { lxc_sys::lxc_container_new(name.as_ptr(), state_dir_c.as_ptr()) };
        let container = NonNull::new(raw)
            .ok_or_else(|| CmError::runtime(&guest.name, "lxc_container_new returned NULL"))?;

        let config_path_c = CString::new(config_path.as_os_str().to_string_lossy().as_ref())
            .map_err(|_| CmError::runtime(&guest.name, "config path contains a NUL byte"))?;

        let load_ok = unsafe {
            let c = container.as_ptr();
            match (*c).load_config {
                Some(f) => f(c, config_path_c.as_ptr()),
                None => false,
            }
        };
        if !load_ok {
            unsafe { lxc_sys::lxc_container_put(container.as_ptr()) };
            return Err(CmError::runtime(&guest.name, "load_config failed"));
        }

        Ok(Box::new(LxcHandle {
            name: guest.name.clone(),
            container,
        }))
    }
}

pub struct LxcHandle {
    name: String,
    container: NonNull<lxc_sys::lxc_container>,
}

// The handle owns a single-threaded reference into liblxc's own container
// object, which liblxc itself makes safe to move across threads as long as
// calls aren't concurrent — true here since the supervisor never shares a
// handle across tasks.
unsafe impl Send for LxcHandle {}

impl LxcHandle {
    fn call_bool(
        &self,
        name: &'static str,
        f: impl FnOnce(*mut lxc_sys::lxc_container) -> Option<bool>,
    ) -> CmResult<()> {
        let ok = f(self.container.as_ptr()).unwrap_or(false);
        if ok {
            Ok(())
        } else {
            Err(CmError::runtime(&self.name, format!("{name} failed")))
        }
    }
}

impl ContainerHandle for LxcHandle {
    fn start(&mut self) -> CmResult<()> {
        self.call_bool("start", |c| unsafe {
            (*c).start.map(|f| f(c, 0, std::ptr::null()))
        })
    }

    fn shutdown(&mut self) -> CmResult<()> {
        // Timeout 0: fire the signal and return immediately; the caller
        // (the supervisor) owns the shutdown deadline, not liblxc.
        self.call_bool("shutdown", |c| unsafe { (*c).shutdown.map(|f| f(c, 0)) })
    }

    fn force_kill(&mut self) -> CmResult<()> {
        self.call_bool("stop", |c| unsafe { (*c).stop.map(|f| f(c)) })
    }

    fn release(&mut self) -> CmResult<()> {
        Ok(())
    }

    fn set_cgroup_device(&mut self, action: CgroupDeviceAction, spec: &DeviceSpec) -> CmResult<()> {
        let subsys = match action {
            CgroupDeviceAction::Allow => "devices.allow",
            CgroupDeviceAction::Deny => "devices.deny",
        };
        let subsys_c = CString::new(subsys).unwrap();
        let value = CString::new(spec.to_string())
            .map_err(|_| CmError::runtime(&self.name, "device spec contains a NUL byte"))?;
        self.call_bool("set_cgroup_item", |c| unsafe {
            (*c).set_cgroup_item
                .map(|f| f(c, subsys_c.as_ptr(), value.as_ptr()))
        })
    }

    fn attach_netif(&mut self, _host_ifname: &str, _guest_ifname: &str) -> CmResult<()> {
        // Dynamic netif attach after the guest has started is owned by the
        // device hot-plug engine (C4), which moves the host interface into
        // the guest's network namespace directly via rtnetlink once it has
        // the guest's pid. This handle only needs to exist so C4 can look up
        // `init_pid()` through it; no liblxc call is needed here.
        Ok(())
    }

    fn init_pid(&self) -> Option<i32> {
        let pid = unsafe {
            let c = self.container.as_ptr();
            (*c).init_pid.map(|f| f(c))
        }?;
        if pid > 0 {
            Some(pid)
        } else {
            None
        }
    }

    fn init_pidfd(&self) -> CmResult<OwnedFd> {
        let pid = self
            .init_pid()
            .ok_or_else(|| CmError::runtime(&self.name, "no init pid to open a pidfd for"))?;
        let fd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid, 0) };
        if fd < 0 {
            return Err(CmError::Io(std::io::Error::last_os_error()));
        }
        Ok(unsafe { OwnedFd::from_raw_fd(fd as i32) })
    }
}

impl Drop for LxcHandle {
    fn drop(&mut self) {
        unsafe { lxc_sys::lxc_container_put(self.container.as_ptr()) };
    }
}
