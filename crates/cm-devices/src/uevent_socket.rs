//! Raw `NETLINK_KOBJECT_UEVENT` socket, wrapped in `AsyncFd` so it
//! multiplexes into the reactor (C1) alongside everything else. No crate in
//! the corpus covers this netlink family — `rtnetlink`/`netlink-packet-route`
//! only speak `NETLINK_ROUTE` — so this is the one place the protocol is
//! opened directly with `libc`, the same direct-syscall style
//! `boxlite::util::process` uses for `kill`/pid checks.

use crate::uevent::UeventMessage;
use std::io;
use std::mem;
use std::os::fd::{FromRawFd, OwnedFd};
use tokio::io::unix::AsyncFd;

/// Kernel multicast group 1 is `NETLINK_KOBJECT_UEVENT`'s uevent group.
const UEVENT_GROUP: u32 = 1;

pub struct UeventSocket {
    inner: AsyncFd<OwnedFd>,
}

impl UeventSocket {
    pub fn open() -> io::Result<Self> {
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
                libc::NETLINK_KOBJECT_UEVENT,
            )
        };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as u16;
        addr.nl_pid = 0; // let the kernel assign a unique port id
        addr.nl_groups = UEVENT_GROUP;

        let ret = unsafe {
            libc::bind(
                std::os::fd::AsRawFd::as_raw_fd(&fd),
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as u32,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(UeventSocket {
            inner: AsyncFd::new(fd)?,
        })
    }

    pub async fn recv(&self) -> io::Result<UeventMessage> {
        loop {
            let mut guard = self.inner.readable().await?;
            let mut buf = [0u8; 8192];
            let result = guard.try_io(|fd| {
                let n = unsafe {
                    libc::recv(
                        std::os::fd::AsRawFd::as_raw_fd(fd.get_ref()),
                        buf.as_mut_ptr() as *mut _,
                        buf.len(),
                        0,
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });
            let n = match result {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            };
            if let Some(msg) = UeventMessage::parse(&buf[..n]) {
                return Ok(msg);
            }
            // Unparseable datagram (shouldn't happen on the real kernel
            // format); drop it and wait for the next one.
        }
    }
}
