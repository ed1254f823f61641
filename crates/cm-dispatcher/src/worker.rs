//! Worker-thread side of the manager-wide storage pipeline (§4.6).
//!
//! Runs on its own dedicated `std::thread`, one phase at a time. Mirrors
//! `manager_mount_operation`/`manager_worker_exec` in
//! `container-manager-operations.c`: try the operation directly; on mount
//! failure, fork a recovery tool (`fsck.ext4 -p` / `mkfs.ext4 -F -I 256`),
//! wait on it with a `{child pidfd, control fd}` poll so a cancel request
//! arriving mid-recovery is noticed within 100ms, then retry the mount once.

use crate::protocol::{self, ControlRequest, ControlResponse};
use cm_config::host::{PipelineEntry, PipelinePhase, PipelineTaskType};
use cm_shared::{CmError, CmResult};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

/// One pipeline entry plus the mutable bookkeeping the spec's data model
/// attaches to it (`runtime_state`, `error_count`) — kept out of
/// `cm_config::PipelineEntry` itself so the parsed config stays immutable.
pub struct RuntimeEntry<'a> {
    pub entry: &'a PipelineEntry,
    pub index: i32,
    pub error_count: u32,
}

pub enum Outcome {
    Complete,
    Cancelled,
    Error,
}

/// Executes every entry of `entries` that runs in `phase`, in table order,
/// reporting one [`ControlResponse`] per entry plus a final phase-done
/// marker, back over `worker_fd`. Returns once the phase is complete or a
/// cancel request stops it early.
pub fn run_phase(worker_fd: &OwnedFd, phase: PipelinePhase, entries: &mut [RuntimeEntry]) {
    let fd = worker_fd.as_raw_fd();

    for re in entries.iter_mut() {
        if !re.entry.runs_in(phase) {
            continue;
        }

        let (operation, outcome) = match re.entry.task_type {
            PipelineTaskType::Mount | PipelineTaskType::Fsck | PipelineTaskType::Mkfs => {
                (protocol::OP_MOUNT, run_mount_entry(fd, re))
            }
            PipelineTaskType::Unmount => (protocol::OP_UNMOUNT, run_unmount_entry(re)),
            PipelineTaskType::Erase => (protocol::OP_ERASE, run_erase_entry(fd, re)),
        };

        let result = match outcome {
            Outcome::Complete => protocol::RESULT_COMPLETE,
            Outcome::Cancelled => protocol::RESULT_CANCEL,
            Outcome::Error => {
                re.error_count += 1;
                protocol::RESULT_ERROR
            }
        };

        let _ = protocol::send_response(
            fd,
            &ControlResponse {
                index: re.index,
                operation,
                result,
            },
        );

        if matches!(outcome_is_cancel(result), true) {
            break;
        }
    }

    let _ = protocol::send_response(
        fd,
        &ControlResponse {
            index: -1,
            operation: protocol::OP_PHASE_DONE,
            result: protocol::RESULT_COMPLETE,
        },
    );
}

fn outcome_is_cancel(result: i32) -> bool {
    result == protocol::RESULT_CANCEL
}

fn mount_flags(mode_rw: bool) -> MsFlags {
    if mode_rw {
        MsFlags::MS_DIRSYNC | MsFlags::MS_NOATIME | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC | MsFlags::MS_SYNCHRONOUS
    } else {
        MsFlags::MS_NOATIME | MsFlags::MS_RDONLY
    }
}

fn try_mount_once(re: &RuntimeEntry) -> CmResult<()> {
    let mountpoint = re
        .entry
        .mountpoint
        .as_ref()
        .ok_or_else(|| CmError::Invariant("mount entry missing mountpoint".into()))?;
    let flags = mount_flags(!matches!(re.entry.mount_flags.as_deref(), Some("ro")));
    mount(
        Some(re.entry.device_path.as_path()),
        mountpoint.as_path(),
        re.entry.fs_options.as_deref(),
        flags,
        None::<&str>,
    )
    .map_err(|e| CmError::Device(format!("mount {} failed: {e}", re.entry.device_path.display())))
}

fn recovery_tool(task_type: PipelineTaskType) -> Option<(&'static str, Vec<String>)> {
    match task_type {
        PipelineTaskType::Fsck => Some(("fsck.ext4", vec!["-p".to_string()])),
        PipelineTaskType::Mkfs => Some(("mkfs.ext4", vec!["-F".to_string(), "-I".to_string(), "256".to_string()])),
        _ => None,
    }
}

/// Mount algorithm (§4.6): try mount; on failure run the recovery tool as a
/// child (polling for cancellation every 100ms while it runs); retry mount
/// once; on second failure, record the error and move on.
fn run_mount_entry(control_fd: RawFd, re: &RuntimeEntry) -> Outcome {
    if try_mount_once(re).is_ok() {
        return Outcome::Complete;
    }

    let Some((tool, mut args)) = recovery_tool(re.entry.task_type) else {
        return Outcome::Error;
    };
    args.push(re.entry.device_path.display().to_string());

    match spawn_and_wait_cancellable(tool, &args, control_fd) {
        Ok(Outcome::Complete) => {
            if try_mount_once(re).is_ok() {
                Outcome::Complete
            } else {
                Outcome::Error
            }
        }
        other => other.unwrap_or(Outcome::Error),
    }
}

/// Unmount algorithm (§4.6): up to ~3s of 50ms-spaced retries, then lazy
/// unmount.
fn run_unmount_entry(re: &RuntimeEntry) -> Outcome {
    let Some(mountpoint) = re.entry.mountpoint.as_ref() else {
        return Outcome::Error;
    };
    let deadline = Instant::now() + Duration::from_millis(3000);
    loop {
        match umount2(mountpoint.as_path(), MntFlags::empty()) {
            Ok(()) => return Outcome::Complete,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(_) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(_) => break,
        }
    }
    match umount2(mountpoint.as_path(), MntFlags::MNT_DETACH) {
        Ok(()) => Outcome::Complete,
        Err(_) => Outcome::Error,
    }
}

/// Erase algorithm (§4.6): wait up to 5s for `/sys/fs/ext4/<dev>` to
/// disappear (confirming the unmount landed), zero the raw block device
/// until `ENOSPC`, then `mkfs.ext4`.
fn run_erase_entry(control_fd: RawFd, re: &RuntimeEntry) -> Outcome {
    let dev_name = match re.entry.device_path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return Outcome::Error,
    };
    let sysfs_node = format!("/sys/fs/ext4/{dev_name}");
    let deadline = Instant::now() + Duration::from_secs(5);
    while Path::new(&sysfs_node).exists() {
        if Instant::now() >= deadline {
            return Outcome::Error;
        }
        if poll_for_cancel_only(control_fd, Duration::from_millis(100)) {
            return Outcome::Cancelled;
        }
    }

    match zero_device(&re.entry.device_path, control_fd) {
        Outcome::Complete => {}
        other => return other,
    }

    match spawn_and_wait_cancellable(
        "mkfs.ext4",
        &["-F".to_string(), re.entry.device_path.display().to_string()],
        control_fd,
    ) {
        Ok(o) => o,
        Err(_) => Outcome::Error,
    }
}

/// Writes zeros to the raw block device until `ENOSPC` (B3: the loop's only
/// valid terminal condition besides cancellation).
fn zero_device(device: &Path, control_fd: RawFd) -> Outcome {
    use std::fs::OpenOptions;
    use std::io::Write;

    let mut file = match OpenOptions::new().write(true).open(device) {
        Ok(f) => f,
        Err(_) => return Outcome::Error,
    };
    let buf = vec![0u8; 1 << 20];
    let mut last_poll = Instant::now();
    loop {
        if last_poll.elapsed() >= Duration::from_millis(100) {
            if poll_for_cancel_only(control_fd, Duration::ZERO) {
                return Outcome::Cancelled;
            }
            last_poll = Instant::now();
        }
        match file.write(&buf) {
            Ok(0) => return Outcome::Complete,
            Ok(_) => continue,
            Err(e) if e.raw_os_error() == Some(libc::ENOSPC) => return Outcome::Complete,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => return Outcome::Error,
        }
    }
}

/// Non-blocking-ish check for a pending cancel request on the control fd,
/// used by the erase loop which otherwise has no child pidfd to poll
/// alongside.
fn poll_for_cancel_only(control_fd: RawFd, timeout: Duration) -> bool {
    let mut pfd = libc::pollfd {
        fd: control_fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let ret = unsafe { libc::poll(&mut pfd, 1, timeout.as_millis() as i32) };
    if ret <= 0 {
        return false;
    }
    match protocol::recv_request(control_fd) {
        Ok(Some(ControlRequest { request, .. })) => request == protocol::REQUEST_CANCEL,
        Ok(None) => true, // peer hung up
        Err(_) => false,
    }
}

/// Forks `tool args...`, polling `{child pidfd, control_fd}` every 100ms
/// (`manager_worker_exec`'s `poll(waiter, 2, 100)`). A cancel request sends
/// `SIGTERM` via `pidfd_send_signal`, falling back to `kill(pid, SIGTERM)`.
fn spawn_and_wait_cancellable(tool: &str, args: &[String], control_fd: RawFd) -> CmResult<Outcome> {
    let mut child = Command::new(tool).args(args).spawn().map_err(CmError::Io)?;
    let pid = child.id() as i32;
    let pidfd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid, 0) };
    let pidfd = if pidfd >= 0 { Some(pidfd as RawFd) } else { None };

    let outcome = loop {
        let mut fds = [
            libc::pollfd {
                fd: pidfd.unwrap_or(-1),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: control_fd,
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), 2, 100) };
        if ret > 0 {
            if pidfd.is_some() && fds[0].revents != 0 {
                break match child.try_wait() {
                    Ok(Some(status)) if status.success() => Outcome::Complete,
                    _ => Outcome::Error,
                };
            }
            if fds[1].revents != 0 {
                match protocol::recv_request(control_fd) {
                    Ok(Some(req)) if req.request == protocol::REQUEST_CANCEL => {
                        if let Some(pfd) = pidfd {
                            let r = unsafe {
                                libc::syscall(libc::SYS_pidfd_send_signal, pfd, libc::SIGTERM, 0, 0)
                            };
                            if r < 0 {
                                let _ = child.kill();
                            }
                        } else {
                            let _ = child.kill();
                        }
                        let _ = child.wait();
                        break Outcome::Cancelled;
                    }
                    Ok(None) => {
                        // hang-up: treat like a cancel
                        let _ = child.kill();
                        let _ = child.wait();
                        break Outcome::Cancelled;
                    }
                    _ => continue,
                }
            }
        } else if ret == 0 {
            match child.try_wait() {
                Ok(Some(status)) => break if status.success() { Outcome::Complete } else { Outcome::Error },
                Ok(None) => continue,
                Err(_) => break Outcome::Error,
            }
        } else {
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                break Outcome::Error;
            }
        }
    };

    if let Some(pfd) = pidfd {
        unsafe { libc::close(pfd) };
    }
    Ok(outcome)
}
