//! Per-guest runtime state (§3 "Runtime (per guest)", "States") — split out
//! from the immutable [`cm_config::Guest`] the supervisor never mutates
//! (design note #2: config and runtime live in separate structs joined by
//! [`cm_shared::GuestIndex`]).

use cm_runtime::ContainerHandle;
use cm_workqueue::WorkqueueSlot;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestStatus {
    Disable,
    NotStarted,
    Started,
    /// Defined by the original state table but never assigned — every
    /// shutdown/reboot request drives the guest into `Shutdown` instead
    /// (§9 open question). Kept for external-status fidelity (§6 maps it
    /// to nothing; no wire status code targets it) and so a future
    /// `reboot_req` handler has somewhere to go without widening the enum.
    Reboot,
    Shutdown,
    Dead,
    Exit,
}

impl GuestStatus {
    /// §6 status code mapping for `GETGUESTS`. `Reboot` has no assigned
    /// wire code since nothing in the state machine currently produces it;
    /// it maps to the same code as `Shutdown` if it's ever reached.
    pub fn wire_code(self) -> i32 {
        match self {
            GuestStatus::Disable => cm_ipc::wire::GUEST_STATUS_DISABLE,
            GuestStatus::NotStarted => cm_ipc::wire::GUEST_STATUS_NOT_STARTED,
            GuestStatus::Started => cm_ipc::wire::GUEST_STATUS_STARTED,
            GuestStatus::Reboot | GuestStatus::Shutdown => cm_ipc::wire::GUEST_STATUS_SHUTDOWN,
            GuestStatus::Dead => cm_ipc::wire::GUEST_STATUS_DEAD,
            GuestStatus::Exit => cm_ipc::wire::GUEST_STATUS_EXIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMode {
    Run,
    Shutdown,
}

/// One host interface bound (or available to be bound) into a guest's
/// network namespace (§3 "Dynamic network interface binding").
#[derive(Debug, Clone)]
pub struct DynamicNetifBinding {
    pub ifname: String,
    pub iftype: cm_config::guest::netif::DynamicIfType,
    pub current_ifindex: u32,
}

impl DynamicNetifBinding {
    pub fn new(ifname: String, iftype: cm_config::guest::netif::DynamicIfType) -> Self {
        DynamicNetifBinding {
            ifname,
            iftype,
            current_ifindex: 0,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.current_ifindex != 0
    }
}

/// The mutable half of a guest record (§3 "Runtime (per guest)"). The
/// config half lives untouched in `cm_config::Guest`; the supervisor is the
/// sole writer of everything here.
pub struct GuestRuntime {
    pub instance: Option<Box<dyn ContainerHandle>>,
    pub status: GuestStatus,
    pub shutdown_deadline: Option<Instant>,
    pub workqueue: WorkqueueSlot,
    pub netif_bindings: Vec<DynamicNetifBinding>,
    pub launch_error_count: u64,
}

impl GuestRuntime {
    pub fn new(index: cm_shared::GuestIndex, netif_bindings: Vec<DynamicNetifBinding>) -> Self {
        GuestRuntime {
            instance: None,
            status: GuestStatus::Disable,
            shutdown_deadline: None,
            workqueue: WorkqueueSlot::new(index),
            netif_bindings,
            launch_error_count: 0,
        }
    }

    pub fn has_pidfd_source(&self) -> bool {
        matches!(self.status, GuestStatus::Started)
    }
}
