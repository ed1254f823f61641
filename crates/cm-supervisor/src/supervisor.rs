//! The supervisor state machine (C7, §4.7) plus the glue into the device
//! hot-plug engine (C4), the manager-wide work dispatcher (C6) and the
//! per-guest workqueue (C5). `reactor.rs` drives this purely synchronous
//! struct from the async event loop; nothing in here ever awaits.

use crate::state::{DynamicNetifBinding, GuestRuntime, GuestStatus, SystemMode};
use cm_config::guest::device::{DeviceBehavior, DynamicDeviceRule};
use cm_config::guest::disk::DiskRedundancy;
use cm_config::host::{HostConfig, PipelinePhase};
use cm_devices::UeventMessage;
use cm_dispatcher::{ControlResponse, Dispatcher};
use cm_ipc::wire::{
    self, GuestInfo, CHANGE_ACCEPT, CHANGE_ERROR, CHANGE_NONAME, LIFECYCLE_ACCEPT, LIFECYCLE_ERROR,
    LIFECYCLE_NONAME, LIFECYCLE_NOROLE,
};
use cm_runtime::ContainerRuntime;
use cm_shared::{log, CmError, CmResult, GuestIndex, RoleName};
use cm_workqueue::{PostExecuteAction, WorkqueueCompletion};
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

pub struct DeviceMatch {
    pub guest: GuestIndex,
    pub behavior: DeviceBehavior,
}

/// Guests whose newly-reached `Started` state means the reactor must
/// register a pidfd watcher and re-scan device/netif state for them
/// (§5 ordering guarantee 3).
pub struct TickOutcome {
    pub newly_started: Vec<GuestIndex>,
    pub should_exit: bool,
}

pub struct Supervisor<R: ContainerRuntime> {
    guests: Vec<cm_config::Guest>,
    roles: cm_config::role::RoleTable,
    runtime: R,
    states: Vec<GuestRuntime>,
    mode: SystemMode,
    host_config: HostConfig,
    exe_path: PathBuf,
    dispatcher: Dispatcher,
    workqueue_tx: Sender<WorkqueueCompletion>,
}

impl<R: ContainerRuntime> Supervisor<R> {
    pub fn new(
        guests: Vec<cm_config::Guest>,
        roles: cm_config::role::RoleTable,
        host_config: HostConfig,
        runtime: R,
        exe_path: PathBuf,
        workqueue_tx: Sender<WorkqueueCompletion>,
    ) -> Self {
        let states = guests
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let bindings = g
                    .netif
                    .dynamic_netif
                    .iter()
                    .map(|n| DynamicNetifBinding::new(n.ifname.clone(), n.iftype))
                    .collect();
                GuestRuntime::new(GuestIndex(i), bindings)
            })
            .collect();

        Supervisor {
            guests,
            roles,
            runtime,
            states,
            mode: SystemMode::Run,
            host_config,
            exe_path,
            dispatcher: Dispatcher::new(),
            workqueue_tx,
        }
    }

    pub fn guest_count(&self) -> usize {
        self.guests.len()
    }

    pub fn guest(&self, idx: GuestIndex) -> &cm_config::Guest {
        &self.guests[idx.0]
    }

    pub fn status(&self, idx: GuestIndex) -> GuestStatus {
        self.states[idx.0].status
    }

    pub fn mode(&self) -> SystemMode {
        self.mode
    }

    pub fn index_by_name(&self, name: &str) -> Option<GuestIndex> {
        self.guests.iter().position(|g| g.name == name).map(GuestIndex)
    }

    fn role_of(&self, idx: GuestIndex) -> RoleName {
        RoleName::from(self.guests[idx.0].role.as_str())
    }

    /// Head of the role's list: the guest currently considered active for
    /// that role. §4.7: "`active_of(role)` returns the head of the role
    /// entry (or error if the head is the terminator)" — an unknown role
    /// has no entry at all, which is the terminator case here.
    fn active_of(&self, role: &RoleName) -> Option<GuestIndex> {
        self.roles.get(role).and_then(|entries| entries.first().copied())
    }

    pub fn init_pid_of(&self, idx: GuestIndex) -> Option<i32> {
        self.states[idx.0].instance.as_deref()?.init_pid()
    }

    /// Opens a fresh pidfd for `idx`'s init process, for the reactor to
    /// register as a C9 exit watcher.
    pub fn open_init_pidfd(&self, idx: GuestIndex) -> CmResult<std::os::fd::OwnedFd> {
        self.states[idx.0]
            .instance
            .as_deref()
            .ok_or_else(|| CmError::Invariant("no instance to open a pidfd for".into()))?
            .init_pidfd()
    }

    pub fn has_pidfd_source(&self, idx: GuestIndex) -> bool {
        self.states[idx.0].has_pidfd_source()
    }

    // ---- boot -----------------------------------------------------------

    /// Every guest starts `Disable`. Guests with an extra disk whose
    /// redundancy policy is `fsck` get their workqueue slot scheduled first
    /// (§4.5 supervisor policy); everyone else goes straight to
    /// `NotStarted` so the first tick's role-promotion sweep starts the
    /// active one per role.
    pub fn boot(&mut self) {
        for i in 0..self.guests.len() {
            let idx = GuestIndex(i);
            let fsck_disk = self.guests[i]
                .base
                .extradisk
                .iter()
                .find(|d| d.redundancy == DiskRedundancy::Fsck)
                .map(|d| d.blockdev[0].clone());

            match fsck_disk {
                Some(device) => {
                    let arg = device.to_string_lossy().into_owned();
                    match self.states[i].workqueue.schedule("fsck", &arg, PostExecuteAction::Relaunch) {
                        Ok(worker) => self.states[i].workqueue.run(worker, self.workqueue_tx.clone()),
                        Err(e) => {
                            log::critical_error(format!(
                                "guest '{}': failed to schedule boot fsck: {e}",
                                self.guests[i].name
                            ));
                            self.states[i].status = GuestStatus::NotStarted;
                        }
                    }
                }
                None => self.states[i].status = GuestStatus::NotStarted,
            }
        }
    }

    pub fn handle_workqueue_completion(&mut self, completion: WorkqueueCompletion) {
        let idx = completion.guest;
        let guest_name = self.guests[idx.0].name.clone();
        match &completion.result {
            Ok(()) => tracing::info!(guest = %guest_name, "workqueue task completed"),
            Err(e) => log::critical_error(format!("guest '{guest_name}': workqueue task failed: {e}")),
        }
        self.states[idx.0].workqueue.complete(completion.result);
        self.states[idx.0].workqueue.cleanup();
        if completion.post_execute_action == PostExecuteAction::Relaunch
            && self.states[idx.0].status == GuestStatus::Disable
        {
            self.states[idx.0].status = GuestStatus::NotStarted;
        }
    }

    // ---- container lifecycle --------------------------------------------

    /// `first_start`: failures during a guest's very first launch are
    /// surfaced (returned as `Err`); failures during a relaunch are logged
    /// and swallowed — expected races with monitor cleanup (§4.3).
    fn start_guest(&mut self, idx: GuestIndex, first_start: bool) -> CmResult<bool> {
        let name = self.guests[idx.0].name.clone();
        let result = self
            .runtime
            .create_instance(&self.guests[idx.0])
            .and_then(|mut handle| {
                handle.start()?;
                Ok(handle)
            });

        match result {
            Ok(handle) => {
                self.states[idx.0].instance = Some(handle);
                self.states[idx.0].status = GuestStatus::Started;
                Ok(true)
            }
            Err(e) => {
                self.states[idx.0].launch_error_count += 1;
                if first_start {
                    Err(e)
                } else {
                    tracing::warn!(guest = %name, error = %e, "relaunch attempt failed");
                    Ok(false)
                }
            }
        }
    }

    fn cleanup_guest(&mut self, idx: GuestIndex) {
        if let Some(mut handle) = self.states[idx.0].instance.take() {
            let _ = handle.release();
        }
    }

    // ---- C7 events --------------------------------------------------------

    pub fn handle_guest_exit(&mut self, idx: GuestIndex) {
        let name = self.guests[idx.0].name.clone();
        match self.states[idx.0].status {
            GuestStatus::Started => {
                log::critical_error(format!("guest '{name}' exited unexpectedly"));
                self.cleanup_guest(idx);
                self.states[idx.0].status = GuestStatus::Dead;
            }
            GuestStatus::Shutdown => {
                self.cleanup_guest(idx);
                self.states[idx.0].status = self.terminal_or_not_started();
            }
            other => {
                tracing::warn!(guest = %name, status = ?other, "unexpected guest exit in this state");
            }
        }
    }

    fn terminal_or_not_started(&self) -> GuestStatus {
        if self.mode == SystemMode::Shutdown {
            GuestStatus::Exit
        } else {
            GuestStatus::NotStarted
        }
    }

    fn apply_halt(&mut self, idx: GuestIndex) -> CmResult<()> {
        let timeout_ms = self.guests[idx.0].base.lifecycle.timeout_ms;
        let handle = self.states[idx.0]
            .instance
            .as_deref_mut()
            .ok_or_else(|| CmError::Invariant("halt requested on a guest with no instance".into()))?;
        handle.shutdown()?;
        self.states[idx.0].shutdown_deadline = Some(Instant::now() + Duration::from_millis(timeout_ms));
        self.states[idx.0].status = GuestStatus::Shutdown;
        Ok(())
    }

    fn apply_force_kill(&mut self, idx: GuestIndex) -> CmResult<()> {
        if let Some(handle) = self.states[idx.0].instance.as_deref_mut() {
            handle.force_kill()?;
        }
        self.cleanup_guest(idx);
        self.states[idx.0].status = self.terminal_or_not_started();
        Ok(())
    }

    /// One IPC-originated lifecycle request against a single guest
    /// (§4.7 `shutdown_req`/`reboot_req` columns, §4.8 subcommands).
    fn apply_lifecycle(&mut self, idx: GuestIndex, subcommand: u32) -> CmResult<()> {
        match subcommand {
            wire::SUB_FORCEREBOOT => self.apply_force_kill(idx),
            wire::SUB_SHUTDOWN | wire::SUB_REBOOT => match self.states[idx.0].status {
                GuestStatus::Started => self.apply_halt(idx),
                GuestStatus::NotStarted if subcommand == wire::SUB_REBOOT => {
                    self.start_guest(idx, false).map(|_| ())
                }
                GuestStatus::Dead => {
                    self.states[idx.0].status = self.terminal_or_not_started();
                    Ok(())
                }
                _ => Ok(()),
            },
            _ => Err(CmError::Invariant(format!("unknown lifecycle subcommand {subcommand}"))),
        }
    }

    pub fn request_lifecycle_by_name(&mut self, name: &str, subcommand: u32) -> i32 {
        let Some(idx) = self.index_by_name(name) else {
            return LIFECYCLE_NONAME;
        };
        match self.apply_lifecycle(idx, subcommand) {
            Ok(()) => LIFECYCLE_ACCEPT,
            Err(e) => {
                tracing::error!(guest = %name, error = %e, "lifecycle request failed");
                LIFECYCLE_ERROR
            }
        }
    }

    pub fn request_lifecycle_by_role(&mut self, role: &str, subcommand: u32) -> i32 {
        let Some(idx) = self.active_of(&RoleName::from(role)) else {
            return LIFECYCLE_NOROLE;
        };
        match self.apply_lifecycle(idx, subcommand) {
            Ok(()) => LIFECYCLE_ACCEPT,
            Err(e) => {
                tracing::error!(role, error = %e, "lifecycle request failed");
                LIFECYCLE_ERROR
            }
        }
    }

    /// §4.8: "find the role owning `name`, rotate its list so `name`
    /// becomes the head; the supervisor's next tick performs the swap via
    /// role promotion."
    pub fn change_active_by_name(&mut self, name: &str) -> i32 {
        let Some(idx) = self.index_by_name(name) else {
            return CHANGE_NONAME;
        };
        let role = self.role_of(idx);
        let Some(entries) = self.roles.get_mut(&role) else {
            return CHANGE_ERROR;
        };
        if let Some(pos) = entries.iter().position(|&e| e == idx) {
            entries.remove(pos);
            entries.insert(0, idx);
            CHANGE_ACCEPT
        } else {
            CHANGE_ERROR
        }
    }

    pub fn guest_list(&self) -> Vec<GuestInfo> {
        self.guests
            .iter()
            .enumerate()
            .map(|(i, g)| GuestInfo {
                name: g.name.clone(),
                role: g.role.clone(),
                status: self.states[i].status.wire_code(),
            })
            .collect()
    }

    /// §4.7 last paragraph + end-of-table note: send every running guest a
    /// halt signal, move everything else straight to `EXIT`, and enter
    /// `mode=SHUTDOWN` so the next ticks only run the shutdown-timeout
    /// check.
    pub fn request_system_shutdown(&mut self) {
        self.mode = SystemMode::Shutdown;
        for i in 0..self.guests.len() {
            let idx = GuestIndex(i);
            match self.states[i].status {
                GuestStatus::Started => {
                    if let Err(e) = self.apply_halt(idx) {
                        tracing::error!(guest = %self.guests[i].name, error = %e, "shutdown halt failed");
                        self.cleanup_guest(idx);
                        self.states[i].status = GuestStatus::Exit;
                    }
                }
                GuestStatus::Shutdown => {}
                _ => self.states[i].status = GuestStatus::Exit,
            }
        }
    }

    pub fn all_guests_terminal(&self) -> bool {
        self.states
            .iter()
            .all(|s| matches!(s.status, GuestStatus::Exit | GuestStatus::Disable))
    }

    /// §5 ordering guarantee 2: one full sweep, role promotion then
    /// shutdown-timeout then dead relaunch, guests visited in config order.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let mut newly_started = Vec::new();

        if self.mode == SystemMode::Run {
            self.promote_roles(&mut newly_started);
        }
        self.check_shutdown_timeouts();
        if self.mode == SystemMode::Run {
            self.relaunch_dead(&mut newly_started);
        }

        TickOutcome {
            newly_started,
            should_exit: self.mode == SystemMode::Shutdown && self.all_guests_terminal(),
        }
    }

    /// §4.7: "for any guest now in NOT_STARTED, call `active_of(role)`...".
    /// `DISABLE` is treated as an equally eligible parked state here, not a
    /// dead end: the original table leaves `DISABLE`'s row empty for every
    /// event, which would strand a guest there forever once demoted by a
    /// role promotion or a `CHANGE_ACTIVE_BY_NAME` swap, with no path back
    /// even after it becomes the role's head again. Scanning both states
    /// keeps `CHANGE_ACTIVE_BY_NAME` (§4.8) actually able to bring a demoted
    /// guest back — see DESIGN.md for this open-question decision.
    fn promote_roles(&mut self, newly_started: &mut Vec<GuestIndex>) {
        for i in 0..self.guests.len() {
            let idx = GuestIndex(i);
            let role = self.role_of(idx);
            let active = self.active_of(&role);

            match self.states[i].status {
                // §4.8 `CHANGE_ACTIVE_BY_NAME` only rotates the role's entry
                // list; it never touches the displaced guest's runtime
                // state. This is where that guest actually learns its role
                // gave its head to someone else — demoted immediately
                // (force_kill+cleanup, the same pairing the STARTED/TIMER_TICK
                // row uses for a SHUTDOWN guest that ignored its halt signal,
                // not a graceful halt+timeout wait) the same tick the new
                // head is promoted, so P1 (exactly one guest per role in
                // {NOT_STARTED,STARTED,SHUTDOWN,DEAD}) never sees two guests
                // STARTED in the same role at once.
                GuestStatus::Started if active != Some(idx) => {
                    let name = self.guests[i].name.clone();
                    if let Some(handle) = self.states[i].instance.as_deref_mut() {
                        if let Err(e) = handle.force_kill() {
                            tracing::warn!(guest = %name, error = %e, "force_kill failed while demoting displaced role head");
                        }
                    }
                    self.cleanup_guest(idx);
                    self.states[i].status = GuestStatus::Disable;
                    self.try_promote(active, newly_started);
                }
                GuestStatus::NotStarted | GuestStatus::Disable if active == Some(idx) => {
                    if self.start_guest(idx, false).unwrap_or(false) {
                        newly_started.push(idx);
                    }
                }
                GuestStatus::NotStarted | GuestStatus::Disable => {
                    self.states[i].status = GuestStatus::Disable;
                    self.cleanup_guest(idx);
                    self.try_promote(active, newly_started);
                }
                _ => {}
            }
        }
    }

    /// Starts `active` if it's sitting idle and eligible, recording it in
    /// `newly_started`. Shared by both promotion paths in `promote_roles`
    /// (a freshly demoted non-head guest, and a freshly demoted former
    /// head) so the new head gets started the same tick it's displaced the
    /// old one.
    fn try_promote(&mut self, active: Option<GuestIndex>, newly_started: &mut Vec<GuestIndex>) {
        let Some(active_idx) = active else { return };
        if matches!(
            self.states[active_idx.0].status,
            GuestStatus::NotStarted | GuestStatus::Disable
        ) && self.start_guest(active_idx, false).unwrap_or(false)
        {
            newly_started.push(active_idx);
        }
    }

    fn check_shutdown_timeouts(&mut self) {
        let now = Instant::now();
        for i in 0..self.guests.len() {
            if self.states[i].status != GuestStatus::Shutdown {
                continue;
            }
            let Some(deadline) = self.states[i].shutdown_deadline else { continue };
            if now < deadline {
                continue;
            }
            let idx = GuestIndex(i);
            log::critical_error(format!(
                "guest '{}' did not shut down within its timeout, forcing",
                self.guests[i].name
            ));
            if let Some(handle) = self.states[i].instance.as_deref_mut() {
                let _ = handle.force_kill();
            }
            self.cleanup_guest(idx);
            self.states[i].shutdown_deadline = None;
            self.states[i].status = self.terminal_or_not_started();
        }
    }

    fn relaunch_dead(&mut self, newly_started: &mut Vec<GuestIndex>) {
        for i in 0..self.guests.len() {
            if self.states[i].status != GuestStatus::Dead {
                continue;
            }
            let idx = GuestIndex(i);
            if self.start_guest(idx, false).unwrap_or(false) {
                newly_started.push(idx);
            }
        }
    }

    // ---- C4 device hot-plug glue ------------------------------------------

    pub fn match_device_rule(&self, uevent: &UeventMessage) -> Option<DeviceMatch> {
        let candidates: Vec<(GuestIndex, &[DynamicDeviceRule])> = self
            .guests
            .iter()
            .enumerate()
            .filter(|(i, _)| self.states[*i].status == GuestStatus::Started)
            .map(|(i, g)| (GuestIndex(i), g.device.dynamic_rules.as_slice()))
            .collect();
        cm_devices::find_match(candidates, uevent).map(|(guest, rule)| DeviceMatch {
            guest,
            behavior: rule.behavior.clone(),
        })
    }

    pub fn commit_cgroup_for(&mut self, idx: GuestIndex, behavior: &DeviceBehavior, uevent: &UeventMessage) -> CmResult<()> {
        let handle = self.states[idx.0]
            .instance
            .as_deref_mut()
            .ok_or_else(|| CmError::Invariant("device event for a guest with no instance".into()))?;
        cm_devices::cgroup_commit::commit_cgroup(handle, behavior, uevent)
    }

    // ---- C4 dynamic netif glue ---------------------------------------------

    /// Every guest's dynamic bindings, flattened for the reactor's
    /// per-tick RTNL re-sync: `(guest, ifname, iftype, currently bound?)`.
    pub fn dynamic_bindings(
        &self,
    ) -> Vec<(GuestIndex, String, cm_config::guest::netif::DynamicIfType, bool)> {
        self.states
            .iter()
            .enumerate()
            .flat_map(|(i, s)| {
                s.netif_bindings
                    .iter()
                    .map(move |b| (GuestIndex(i), b.ifname.clone(), b.iftype, b.is_bound()))
            })
            .collect()
    }

    pub fn mark_bound(&mut self, idx: GuestIndex, ifname: &str, ifindex: u32) {
        if let Some(binding) = self.states[idx.0]
            .netif_bindings
            .iter_mut()
            .find(|b| b.ifname == ifname)
        {
            binding.current_ifindex = ifindex;
        }
    }

    pub fn mark_unbound(&mut self, idx: GuestIndex, ifname: &str) {
        if let Some(binding) = self.states[idx.0]
            .netif_bindings
            .iter_mut()
            .find(|b| b.ifname == ifname)
        {
            binding.current_ifindex = 0;
        }
    }

    pub fn exe_path(&self) -> &PathBuf {
        &self.exe_path
    }

    // ---- C6 manager-wide storage pipeline -----------------------------------

    pub fn host_config(&self) -> &HostConfig {
        &self.host_config
    }

    pub fn dispatch_phase(&mut self, phase: PipelinePhase) -> CmResult<RawFd> {
        self.dispatcher.dispatch(phase, self.host_config.pipeline.clone())
    }

    pub fn pipeline_busy(&self) -> bool {
        self.dispatcher.is_busy()
    }

    pub fn pipeline_recv(&mut self) -> CmResult<Option<ControlResponse>> {
        self.dispatcher.recv()
    }

    pub fn pipeline_finish(&mut self) {
        self.dispatcher.finish();
    }
}
