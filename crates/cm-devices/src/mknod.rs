//! Device node creation inside a guest's root.
//!
//! Creating a node directly from the manager process would mean resolving
//! `/proc/<pid>/root/<path>` and trusting that no component of `<path>` is
//! attacker-controlled enough to escape via `..` or a symlink race. Instead
//! we re-exec ourselves as a tiny helper that `chroot`s into the guest root
//! first and only then does its path work, so a racing rename inside the
//! guest can't walk the helper out of the jail — the same shape as the
//! teacher's subprocess-isolation pattern in `spawn_subprocess`, just
//! reused for confinement instead of shim reconnection.

use cm_shared::{CmError, CmResult};
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub const HELPER_FLAG: &str = "--internal-mknod-helper";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Char,
    Block,
}

#[derive(Debug, Clone)]
pub struct DevNodeRequest {
    pub guest_init_pid: i32,
    pub guest_path: PathBuf,
    pub kind: NodeKind,
    pub major: u32,
    pub minor: u32,
    pub mode: u32,
}

/// Spawns the helper to create (or, if `remove` is set, unlink) one device
/// node inside a running guest's root.
pub async fn create_devnode(exe: &Path, req: &DevNodeRequest) -> CmResult<()> {
    run_helper(exe, req, false).await
}

pub async fn remove_devnode(exe: &Path, req: &DevNodeRequest) -> CmResult<()> {
    run_helper(exe, req, true).await
}

async fn run_helper(exe: &Path, req: &DevNodeRequest, remove: bool) -> CmResult<()> {
    let kind_arg = match req.kind {
        NodeKind::Char => "c",
        NodeKind::Block => "b",
    };
    let status = Command::new(exe)
        .arg(HELPER_FLAG)
        .arg(if remove { "remove" } else { "create" })
        .arg(req.guest_init_pid.to_string())
        .arg(&req.guest_path)
        .arg(kind_arg)
        .arg(req.major.to_string())
        .arg(req.minor.to_string())
        .arg(req.mode.to_string())
        .status()
        .await
        .map_err(CmError::Io)?;

    if status.success() {
        Ok(())
    } else {
        Err(CmError::Device(format!(
            "mknod helper exited with {status} for {}",
            req.guest_path.display()
        )))
    }
}

/// Entry point run *inside* the re-exec'd helper process, after `main()`
/// detects [`HELPER_FLAG`] as `argv[1]`. Never called from the reactor
/// process itself.
pub fn run_as_helper(args: &[String]) -> i32 {
    match run_as_helper_inner(args) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "mknod helper failed");
            1
        }
    }
}

fn run_as_helper_inner(args: &[String]) -> CmResult<()> {
    let [op, pid, path, kind, major, minor, mode] = args else {
        return Err(CmError::Invariant("mknod helper called with wrong argc".into()));
    };
    let pid: i32 = pid
        .parse()
        .map_err(|_| CmError::Invariant("bad pid argument".into()))?;

    enter_guest_root(pid)?;

    if op == "remove" {
        let _ = std::fs::remove_file(path);
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent).map_err(CmError::Io)?;
    }

    let major: u32 = major
        .parse()
        .map_err(|_| CmError::Invariant("bad major argument".into()))?;
    let minor: u32 = minor
        .parse()
        .map_err(|_| CmError::Invariant("bad minor argument".into()))?;
    let mode: u32 = mode
        .parse()
        .map_err(|_| CmError::Invariant("bad mode argument".into()))?;
    let dev_mode = match kind.as_str() {
        "b" => libc::S_IFBLK,
        _ => libc::S_IFCHR,
    };

    let path_c = std::ffi::CString::new(path.as_str())
        .map_err(|_| CmError::Invariant("guest path contains a NUL byte".into()))?;
    let rdev = unsafe { libc::makedev(major, minor) };
    let ret = unsafe { libc::mknod(path_c.as_ptr(), dev_mode | mode, rdev) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::AlreadyExists {
            return Ok(());
        }
        return Err(CmError::Io(err));
    }
    Ok(())
}

fn enter_guest_root(init_pid: i32) -> CmResult<()> {
    let root = format!("/proc/{init_pid}/root");
    let root_c = std::ffi::CString::new(root).unwrap();
    let fd = unsafe { libc::open(root_c.as_ptr(), libc::O_RDONLY | libc::O_DIRECTORY) };
    if fd < 0 {
        return Err(CmError::Io(std::io::Error::last_os_error()));
    }
    let ret = unsafe { libc::fchdir(fd) };
    unsafe { libc::close(fd) };
    if ret != 0 {
        return Err(CmError::Io(std::io::Error::last_os_error()));
    }
    let dot = std::ffi::CString::new(".").unwrap();
    if unsafe { libc::chroot(dot.as_ptr()) } != 0 {
        return Err(CmError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}
