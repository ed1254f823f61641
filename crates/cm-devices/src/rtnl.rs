//! RTNL link tracking for dynamic network interface binding (§4.4 input b).
//!
//! Grounded directly in `vinit::main::setup_network`'s use of `rtnetlink`
//! for link lookup/configuration; this module only needs the read side
//! (`link().get()`) plus `setns`-style namespace moves, not full address
//! and route management.

use cm_shared::{CmError, CmResult};
use futures::stream::TryStreamExt;
use rtnetlink::Handle;

pub struct RtnlLink {
    pub ifindex: u32,
    pub ifname: String,
}

pub async fn connect() -> CmResult<(Handle, impl std::future::Future<Output = ()>)> {
    let (conn, handle, _) =
        rtnetlink::new_connection().map_err(|e| CmError::Netlink(e.to_string()))?;
    Ok((handle, conn))
}

pub async fn find_link(handle: &Handle, ifname: &str) -> CmResult<Option<RtnlLink>> {
    let mut links = handle.link().get().match_name(ifname.to_string()).execute();
    match links.try_next().await {
        Ok(Some(msg)) => Ok(Some(RtnlLink {
            ifindex: msg.header.index,
            ifname: ifname.to_string(),
        })),
        Ok(None) => Ok(None),
        Err(rtnetlink::Error::NetlinkError(e)) if e.code.map(|c| c.get() == -19).unwrap_or(false) => {
            // ENODEV: interface doesn't exist (yet).
            Ok(None)
        }
        Err(e) => Err(CmError::Netlink(e.to_string())),
    }
}

/// Moves a host network interface into a guest's network namespace by pid,
/// the handoff step of dynamic netif binding.
pub async fn move_to_netns(handle: &Handle, ifindex: u32, guest_init_pid: i32) -> CmResult<()> {
    handle
        .link()
        .set(ifindex)
        .setns_by_pid(guest_init_pid as u32)
        .execute()
        .await
        .map_err(|e| CmError::Netlink(e.to_string()))
}
