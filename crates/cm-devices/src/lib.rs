//! Device hot-plug engine (§4.4): kernel uevent parsing, device-rule
//! matching, cgroup allow/deny commit, mknod-in-guest-root, netns uevent
//! injection, and RTNL-tracked dynamic network interface binding.

pub mod cgroup_commit;
pub mod mknod;
pub mod netif_inject;
pub mod rtnl;
pub mod rules;
pub mod uevent;
pub mod uevent_socket;
pub mod vxcan;

pub use rules::{find_match, rule_matches};
pub use uevent::UeventMessage;
pub use uevent_socket::UeventSocket;
