//! Abstract UNIX `SOCK_SEQPACKET` listener (§4.8, §6).
//!
//! No crate in the corpus wraps abstract-namespace UNIX sockets with
//! seqpacket framing, so this opens the socket directly with `libc` and
//! wraps it in `AsyncFd` — the same shape `cm_devices::uevent_socket` uses
//! for its own kernel-facing raw socket.

use cm_shared::{CmError, CmResult};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tokio::io::unix::AsyncFd;

pub const SOCKET_NAME: &str = "agl/container-manager-interface";

fn abstract_sockaddr(name: &str) -> (libc::sockaddr_un, libc::socklen_t) {
    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as u16;
    // Abstract namespace: sun_path[0] = '\0', followed by the name with no
    // terminating NUL of its own.
    let name_bytes = name.as_bytes();
    addr.sun_path[0] = 0;
    for (i, b) in name_bytes.iter().enumerate() {
        addr.sun_path[i + 1] = *b as i8;
    }
    let len = (mem::size_of::<libc::sa_family_t>() + 1 + name_bytes.len()) as libc::socklen_t;
    (addr, len)
}

fn new_seqpacket_socket() -> io::Result<RawFd> {
    let fd = unsafe {
        libc::socket(
            libc::AF_UNIX,
            libc::SOCK_SEQPACKET | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            0,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

pub struct IpcListener {
    inner: AsyncFd<OwnedFd>,
}

impl IpcListener {
    pub fn bind() -> io::Result<Self> {
        let fd = new_seqpacket_socket()?;
        let (addr, len) = abstract_sockaddr(SOCKET_NAME);
        let ret = unsafe { libc::bind(fd, &addr as *const _ as *const libc::sockaddr, len) };
        if ret != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        let ret = unsafe { libc::listen(fd, 1) };
        if ret != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(IpcListener {
            inner: AsyncFd::new(owned)?,
        })
    }

    /// Accepts the next client connection. The caller is responsible for
    /// dropping any previously accepted [`IpcSession`] (§4.8: "single
    /// concurrent session; second connect drops the first's session").
    pub async fn accept(&self) -> io::Result<IpcSession> {
        loop {
            let mut guard = self.inner.readable().await?;
            let result = guard.try_io(|fd| {
                let raw = unsafe { libc::accept4(fd.as_raw_fd(), std::ptr::null_mut(), std::ptr::null_mut(), libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK) };
                if raw < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(raw)
                }
            });
            match result {
                Ok(Ok(raw)) => {
                    let owned = unsafe { OwnedFd::from_raw_fd(raw) };
                    return Ok(IpcSession {
                        inner: AsyncFd::new(owned)?,
                    });
                }
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
    }
}

pub struct IpcSession {
    inner: AsyncFd<OwnedFd>,
}

impl IpcSession {
    /// Reads one request datagram. `Ok(None)` means the peer hung up.
    pub async fn recv(&self) -> CmResult<Option<Vec<u8>>> {
        loop {
            let mut guard = self.inner.readable().await.map_err(CmError::Io)?;
            let mut buf = [0u8; crate::wire::COMMAND_BUFSIZE_MAX];
            let result = guard.try_io(|fd| {
                let n = unsafe { libc::recv(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len(), 0) };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });
            return match result {
                Ok(Ok(0)) => Ok(None),
                Ok(Ok(n)) => Ok(Some(buf[..n].to_vec())),
                Ok(Err(e)) => Err(CmError::Io(e)),
                Err(_would_block) => continue,
            };
        }
    }

    pub async fn send(&self, payload: &[u8]) -> CmResult<()> {
        loop {
            let mut guard = self.inner.writable().await.map_err(CmError::Io)?;
            let result = guard.try_io(|fd| {
                let n = unsafe {
                    libc::send(fd.as_raw_fd(), payload.as_ptr().cast(), payload.len(), libc::MSG_NOSIGNAL)
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(())
                }
            });
            return match result {
                Ok(r) => r.map_err(CmError::Io),
                Err(_would_block) => continue,
            };
        }
    }
}
