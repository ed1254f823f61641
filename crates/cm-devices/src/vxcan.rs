//! SocketCAN `vxcan` dynamic interface creation (supplements the original
//! veth-only dynamic netif binding; see `original_source/src/socketcan-util.c`).
//!
//! `rtnetlink`'s link-add builder only has first-class support for the link
//! kinds it ships helpers for (veth, bridge, vlan, …) — `vxcan` isn't one of
//! them. Rather than hand-roll the `IFLA_INFO_KIND`/`IFLA_INFO_DATA`
//! attribute encoding, we shell out to `ip link add`, exactly the kind of
//! "not every netlink detail has a typed helper" escape hatch the corpus
//! itself reaches for with raw syscalls elsewhere.

use cm_shared::{CmError, CmResult};
use tokio::process::Command;

pub async fn create_vxcan_pair(host_side: &str, guest_side: &str) -> CmResult<()> {
    let status = Command::new("ip")
        .args([
            "link", "add", host_side, "type", "vxcan", "peer", "name", guest_side,
        ])
        .status()
        .await
        .map_err(CmError::Io)?;

    if status.success() {
        Ok(())
    } else {
        Err(CmError::Netlink(format!(
            "ip link add vxcan {host_side}/{guest_side} failed: {status}"
        )))
    }
}

pub async fn delete(ifname: &str) -> CmResult<()> {
    let status = Command::new("ip")
        .args(["link", "delete", ifname])
        .status()
        .await
        .map_err(CmError::Io)?;
    if status.success() {
        Ok(())
    } else {
        Err(CmError::Netlink(format!("ip link delete {ifname} failed: {status}")))
    }
}
