//! Host/worker wire structs for the manager-wide work dispatcher (§4.6).
//!
//! Grounded directly on the original's `worker_request_t`/`worker_response_t`
//! pair: a fixed-size struct written/read whole over a `socketpair(2)`
//! SEQPACKET fd, exactly the "detached worker threads communicating via
//! socketpair" rearchitecture note (§9 item 7). Kept as raw repr(C) structs
//! read/written through `libc` rather than routed through `bincode`, the
//! same choice `cm-devices`'s uevent socket makes for a kernel-facing wire
//! format with a fixed byte layout.

use cm_shared::{CmError, CmResult};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Host -> worker. `request = 1` asks the worker to cancel the entry named
/// by `index`; `-1` cancels whichever entry is currently running.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ControlRequest {
    pub index: i32,
    pub request: i32,
}

pub const REQUEST_NONE: i32 = 0;
pub const REQUEST_CANCEL: i32 = 1;

/// Worker -> host, one per completed pipeline entry, plus a final one with
/// `index = -1` marking the whole phase done.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ControlResponse {
    pub index: i32,
    pub operation: i32,
    pub result: i32,
}

pub const OP_MOUNT: i32 = 0;
pub const OP_UNMOUNT: i32 = 1;
pub const OP_ERASE: i32 = 2;
pub const OP_PHASE_DONE: i32 = 99;

pub const RESULT_COMPLETE: i32 = 0;
pub const RESULT_CANCEL: i32 = 1;
pub const RESULT_ERROR: i32 = -1;

pub struct SocketPair {
    pub host: OwnedFd,
    pub worker: OwnedFd,
}

/// A `socketpair(AF_UNIX, SOCK_SEQPACKET)` fd pair, one end for the host
/// (the supervisor's reactor), one for the worker thread.
pub fn seqpacket_pair() -> CmResult<SocketPair> {
    let mut fds = [0i32; 2];
    let ret = unsafe {
        libc::socketpair(
            libc::AF_UNIX,
            libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC,
            0,
            fds.as_mut_ptr(),
        )
    };
    if ret != 0 {
        return Err(CmError::Io(std::io::Error::last_os_error()));
    }
    Ok(SocketPair {
        host: unsafe { OwnedFd::from_raw_fd(fds[0]) },
        worker: unsafe { OwnedFd::from_raw_fd(fds[1]) },
    })
}

pub fn send_request(fd: RawFd, req: &ControlRequest) -> CmResult<()> {
    write_struct(fd, req)
}

pub fn recv_request(fd: RawFd) -> CmResult<Option<ControlRequest>> {
    read_struct(fd)
}

pub fn send_response(fd: RawFd, resp: &ControlResponse) -> CmResult<()> {
    write_struct(fd, resp)
}

pub fn recv_response(fd: RawFd) -> CmResult<Option<ControlResponse>> {
    read_struct(fd)
}

fn write_struct<T: Copy>(fd: RawFd, value: &T) -> CmResult<()> {
    let len = std::mem::size_of::<T>();
    loop {
        // MSG_NOSIGNAL: the peer may have hung up its end deliberately (the
        // cancellation mechanism), which would otherwise raise SIGPIPE.
        let ret = unsafe { libc::send(fd, (value as *const T).cast(), len, libc::MSG_NOSIGNAL) };
        if ret >= 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(CmError::Io(err));
        }
    }
}

/// Reads exactly one datagram. Returns `Ok(None)` on a zero-length read,
/// which `recvmsg`/`read` on a SEQPACKET socket report when the peer has
/// hung up — the host-side cancellation mechanism (§4.6: "host->worker is a
/// one-way hang-up of the control socket").
fn read_struct<T: Copy>(fd: RawFd) -> CmResult<Option<T>> {
    let mut buf = std::mem::MaybeUninit::<T>::uninit();
    let len = std::mem::size_of::<T>();
    loop {
        let ret = unsafe { libc::recv(fd, buf.as_mut_ptr().cast(), len, 0) };
        if ret == 0 {
            return Ok(None);
        }
        if ret > 0 {
            return Ok(Some(unsafe { buf.assume_init() }));
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(CmError::Io(err));
        }
    }
}

pub fn raw(fd: &OwnedFd) -> RawFd {
    fd.as_raw_fd()
}
