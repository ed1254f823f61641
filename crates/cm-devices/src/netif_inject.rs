//! Re-injects a kernel uevent into a guest's network namespace, so udev (or
//! equivalent) running inside the guest sees the device appear/disappear.
//!
//! Entering another process's netns and opening a netlink socket inside it
//! has to happen from a forked child — `setns(CLONE_NEWNET)` on a
//! multi-threaded process only ever applies to the calling thread, and
//! tokio's reactor is exactly such a process. We re-exec instead of
//! `fork()`ing directly out of the async runtime, for the same reason
//! `mknod`'s helper does.

use crate::uevent::UeventMessage;
use cm_shared::{CmError, CmResult};
use std::path::Path;
use tokio::process::Command;

pub const HELPER_FLAG: &str = "--internal-netns-uevent-helper";

pub async fn inject(exe: &Path, guest_init_pid: i32, uevent: &UeventMessage) -> CmResult<()> {
    let payload = uevent.reencode();
    let encoded = hex_encode(&payload);

    let status = Command::new(exe)
        .arg(HELPER_FLAG)
        .arg(guest_init_pid.to_string())
        .arg(encoded)
        .status()
        .await
        .map_err(CmError::Io)?;

    if status.success() {
        Ok(())
    } else {
        Err(CmError::Device(format!(
            "netns uevent helper exited with {status}"
        )))
    }
}

pub fn run_as_helper(args: &[String]) -> i32 {
    match run_as_helper_inner(args) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "netns uevent helper failed");
            1
        }
    }
}

fn run_as_helper_inner(args: &[String]) -> CmResult<()> {
    let [pid, payload_hex] = args else {
        return Err(CmError::Invariant("netns helper called with wrong argc".into()));
    };
    let pid: i32 = pid
        .parse()
        .map_err(|_| CmError::Invariant("bad pid argument".into()))?;
    let payload = hex_decode(payload_hex)
        .ok_or_else(|| CmError::Invariant("bad hex payload".into()))?;

    enter_netns(pid)?;
    send_on_uevent_socket(&payload)
}

fn enter_netns(pid: i32) -> CmResult<()> {
    let path = format!("/proc/{pid}/ns/net");
    let path_c = std::ffi::CString::new(path).unwrap();
    let fd = unsafe { libc::open(path_c.as_ptr(), libc::O_RDONLY) };
    if fd < 0 {
        return Err(CmError::Io(std::io::Error::last_os_error()));
    }
    let ret = unsafe { libc::setns(fd, libc::CLONE_NEWNET) };
    unsafe { libc::close(fd) };
    if ret != 0 {
        return Err(CmError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

fn send_on_uevent_socket(payload: &[u8]) -> CmResult<()> {
    let fd = unsafe {
        libc::socket(
            libc::AF_NETLINK,
            libc::SOCK_RAW | libc::SOCK_CLOEXEC,
            libc::NETLINK_KOBJECT_UEVENT,
        )
    };
    if fd < 0 {
        return Err(CmError::Io(std::io::Error::last_os_error()));
    }

    let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
    addr.nl_family = libc::AF_NETLINK as u16;
    addr.nl_groups = 1;

    let ret = unsafe {
        libc::sendto(
            fd,
            payload.as_ptr() as *const _,
            payload.len(),
            0,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_nl>() as u32,
        )
    };
    unsafe { libc::close(fd) };
    if ret < 0 {
        return Err(CmError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips() {
        let data = b"add@/devices/x\0ACTION=add\0".to_vec();
        let encoded = hex_encode(&data);
        assert_eq!(hex_decode(&encoded).unwrap(), data);
    }
}
