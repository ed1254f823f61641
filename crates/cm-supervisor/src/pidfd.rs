//! Guest exit monitoring via `pidfd` (C9, §4.9): race-free against pid reuse,
//! unlike polling `kill(pid, 0)`.
//!
//! Grounded on `vinit::pidfd::PidFd` — same `AsyncFd<OwnedFd>` wrapper and
//! `pidfd_send_signal` syscall, adapted to take an already-open fd from
//! [`cm_runtime::ContainerHandle::init_pidfd`] instead of opening one from a
//! bare pid itself.

use nix::sys::signal::Signal;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use tokio::io::unix::AsyncFd;

pub struct PidFd(AsyncFd<OwnedFd>);

impl PidFd {
    pub fn new(fd: OwnedFd) -> std::io::Result<Self> {
        Ok(PidFd(AsyncFd::new(fd)?))
    }

    /// Resolves once the pidfd becomes readable, which happens exactly when
    /// the process it refers to has exited.
    pub async fn wait_for_exit(&self) {
        loop {
            match self.0.readable().await {
                Ok(mut guard) => {
                    guard.clear_ready();
                    return;
                }
                Err(_) => return,
            }
        }
    }

    pub fn send_signal(&self, signal: Signal) -> std::io::Result<()> {
        let ret = unsafe {
            libc::syscall(
                libc::SYS_pidfd_send_signal,
                self.0.as_raw_fd(),
                signal as i32,
                std::ptr::null::<libc::siginfo_t>(),
                0,
            )
        };
        if ret < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

impl AsRawFd for PidFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}
