//! The single-threaded event reactor (C1, §4.1): a `tokio::select!` loop
//! standing in for the original's custom `poll`-based dispatch, multiplexing
//! the uevent socket, RTNL, the IPC listener/session, per-guest pidfds, the
//! 50 ms timer, the manager-wide work dispatcher and process signals.

use crate::ipc_handler;
use crate::pidfd::PidFd;
use crate::supervisor::Supervisor;
use cm_devices::uevent_socket::UeventSocket;
use cm_dispatcher::protocol::OP_PHASE_DONE;
use cm_runtime::ContainerRuntime;
use cm_shared::{log, GuestIndex};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::os::fd::{AsRawFd, RawFd};
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::io::unix::AsyncFd;
use tokio::time::interval;

const TICK_PERIOD: Duration = Duration::from_millis(50);
const WATCHDOG_PERIOD: Duration = Duration::from_secs(5);

/// Thin `AsRawFd` wrapper so the dispatcher's borrowed control fd can be
/// registered with `AsyncFd` without the reactor taking ownership of it —
/// [`cm_dispatcher::Dispatcher`] already owns the real `OwnedFd`.
struct BorrowedFd(RawFd);

impl AsRawFd for BorrowedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

pub struct Reactor<R: ContainerRuntime> {
    supervisor: Supervisor<R>,
    uevent_socket: UeventSocket,
    rtnl: rtnetlink::Handle,
    ipc_listener: cm_ipc::IpcListener,
    ipc_session: Option<cm_ipc::IpcSession>,
    exit_watchers: FuturesUnordered<Pin<Box<dyn std::future::Future<Output = GuestIndex> + Send>>>,
    pipeline_watch: Option<AsyncFd<BorrowedFd>>,
    workqueue_rx: tokio::sync::mpsc::UnboundedReceiver<cm_workqueue::WorkqueueCompletion>,
}

impl<R: ContainerRuntime> Reactor<R> {
    pub fn new(
        supervisor: Supervisor<R>,
        uevent_socket: UeventSocket,
        rtnl: rtnetlink::Handle,
        ipc_listener: cm_ipc::IpcListener,
        workqueue_rx: tokio::sync::mpsc::UnboundedReceiver<cm_workqueue::WorkqueueCompletion>,
    ) -> Self {
        Reactor {
            supervisor,
            uevent_socket,
            rtnl,
            ipc_listener,
            ipc_session: None,
            exit_watchers: FuturesUnordered::new(),
            pipeline_watch: None,
            workqueue_rx,
        }
    }

    fn register_exit_watcher(&mut self, idx: GuestIndex) {
        let fd = match self.supervisor.open_init_pidfd(idx) {
            Ok(fd) => fd,
            Err(e) => {
                tracing::error!(error = %e, "failed to open pidfd for newly started guest");
                return;
            }
        };
        let pidfd = match PidFd::new(fd) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "failed to register pidfd with the reactor");
                return;
            }
        };
        self.exit_watchers
            .push(Box::pin(async move {
                pidfd.wait_for_exit().await;
                idx
            }));
    }

    fn watch_pipeline_fd(&mut self, fd: RawFd) {
        self.pipeline_watch = AsyncFd::new(BorrowedFd(fd)).ok();
    }

    /// §4.6 boot/shutdown entry points: dispatch the storage pipeline for
    /// `phase` and block (within the reactor, cooperatively) until it
    /// reports done — called only at startup and at shutdown, never while
    /// guests are running, so this doesn't compete with the main loop.
    async fn run_pipeline_to_completion(&mut self, phase: cm_config::host::PipelinePhase) {
        let fd = match self.supervisor.dispatch_phase(phase) {
            Ok(fd) => fd,
            Err(e) => {
                log::critical_error(format!("failed to dispatch storage pipeline phase: {e}"));
                return;
            }
        };
        self.watch_pipeline_fd(fd);
        loop {
            let Some(watch) = &self.pipeline_watch else { break };
            let mut guard = match watch.readable().await {
                Ok(g) => g,
                Err(_) => break,
            };
            guard.clear_ready();
            loop {
                match self.supervisor.pipeline_recv() {
                    Ok(Some(resp)) => {
                        if resp.operation == OP_PHASE_DONE {
                            self.supervisor.pipeline_finish();
                            self.pipeline_watch = None;
                            return;
                        }
                        if resp.result != cm_dispatcher::protocol::RESULT_COMPLETE {
                            tracing::warn!(index = resp.index, result = resp.result, "pipeline entry did not complete cleanly");
                        }
                    }
                    Ok(None) => {
                        self.supervisor.pipeline_finish();
                        self.pipeline_watch = None;
                        return;
                    }
                    Err(_) => break,
                }
            }
        }
    }

    /// Boots the fleet: runs the `Start` storage phase, starts the
    /// workqueue-gated boot sweep, then the first promotion tick, then
    /// signals systemd readiness.
    pub async fn boot(&mut self) {
        self.run_pipeline_to_completion(cm_config::host::PipelinePhase::Start).await;
        self.supervisor.boot();
        self.run_tick().await;
        let _ = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]);
    }

    async fn run_tick(&mut self) {
        let outcome = self.supervisor.tick(Instant::now());
        for idx in outcome.newly_started {
            self.register_exit_watcher(idx);
        }
        self.resync_dynamic_netifs().await;
    }

    async fn resync_dynamic_netifs(&mut self) {
        use cm_config::guest::netif::DynamicIfType;

        for (idx, ifname, iftype, is_bound) in self.supervisor.dynamic_bindings() {
            let mut found = cm_devices::rtnl::find_link(&self.rtnl, &ifname).await.ok().flatten();

            // `vxcan` pairs don't pre-exist like static veths do: the guest
            // side has to be brought up on the host before it can be found
            // and handed into the netns, same two-step the original
            // `socketcanutil_create_vxcan_peer`/move dance does.
            if found.is_none() && !is_bound && iftype == DynamicIfType::Vxcan {
                let host_side = format!("{ifname}-host");
                match cm_devices::vxcan::create_vxcan_pair(&host_side, &ifname).await {
                    Ok(()) => {
                        found = cm_devices::rtnl::find_link(&self.rtnl, &ifname).await.ok().flatten();
                    }
                    Err(e) => tracing::warn!(ifname, error = %e, "failed to create vxcan pair"),
                }
            }

            match (found, is_bound) {
                (Some(link), false) => {
                    let Some(pid) = self.supervisor.init_pid_of(idx) else { continue };
                    match cm_devices::rtnl::move_to_netns(&self.rtnl, link.ifindex, pid).await {
                        Ok(()) => self.supervisor.mark_bound(idx, &ifname, link.ifindex),
                        Err(e) => tracing::warn!(ifname, error = %e, "failed to bind dynamic netif"),
                    }
                }
                (None, true) => self.supervisor.mark_unbound(idx, &ifname),
                _ => {}
            }
        }
    }

    async fn handle_uevent(&mut self, msg: cm_devices::UeventMessage) {
        let Some(device_match) = self.supervisor.match_device_rule(&msg) else { return };
        let idx = device_match.guest;
        let behavior = device_match.behavior;

        if let Err(e) = self.supervisor.commit_cgroup_for(idx, &behavior, &msg) {
            tracing::warn!(error = %e, "cgroup commit failed for matched device rule");
        }

        let Some(pid) = self.supervisor.init_pid_of(idx) else { return };
        let exe = self.supervisor.exe_path().clone();

        if behavior.create_devnode {
            if let (Some(devname), Some(major), Some(minor)) = (&msg.devname, msg.major, msg.minor) {
                let kind = if msg.subsystem.as_deref() == Some("block") {
                    cm_devices::mknod::NodeKind::Block
                } else {
                    cm_devices::mknod::NodeKind::Char
                };
                let req = cm_devices::mknod::DevNodeRequest {
                    guest_init_pid: pid,
                    guest_path: std::path::PathBuf::from("/dev").join(devname),
                    kind,
                    major,
                    minor,
                    mode: 0o660,
                };
                let result = if msg.action == "remove" {
                    cm_devices::mknod::remove_devnode(&exe, &req).await
                } else {
                    cm_devices::mknod::create_devnode(&exe, &req).await
                };
                if let Err(e) = result {
                    tracing::warn!(error = %e, "devnode helper failed");
                }
            }
        }

        if behavior.inject_uevent {
            if let Err(e) = cm_devices::netif_inject::inject(&exe, pid, &msg).await {
                tracing::warn!(error = %e, "netns uevent injection failed");
            }
        }
    }

    async fn drain_ipc_session(&mut self) {
        let Some(session) = &self.ipc_session else { return };
        match session.recv().await {
            Ok(Some(buf)) => {
                let response = match cm_ipc::decode_request(&buf) {
                    Ok(request) => ipc_handler::handle(&mut self.supervisor, request),
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed IPC request");
                        self.ipc_session = None;
                        return;
                    }
                };
                let encoded = cm_ipc::encode_response(&response);
                if let Some(session) = &self.ipc_session {
                    if let Err(e) = session.send(&encoded).await {
                        tracing::warn!(error = %e, "failed to send IPC response");
                        self.ipc_session = None;
                    }
                }
            }
            Ok(None) | Err(_) => self.ipc_session = None,
        }
    }

    /// Runs until a system shutdown drains every guest to a terminal state.
    pub async fn run(mut self) {
        self.boot().await;

        let mut ticker = interval(TICK_PERIOD);
        let mut watchdog = interval(WATCHDOG_PERIOD);
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("failed to install SIGINT handler");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick().await;
                    if self.supervisor.mode() == crate::state::SystemMode::Shutdown
                        && self.supervisor.all_guests_terminal()
                    {
                        break;
                    }
                }

                _ = watchdog.tick() => {
                    let _ = sd_notify::notify(false, &[sd_notify::NotifyState::Watchdog]);
                }

                _ = sigterm.recv() => {
                    tracing::info!("SIGTERM received, beginning system shutdown");
                    self.supervisor.request_system_shutdown();
                }

                _ = sigint.recv() => {
                    tracing::info!("SIGINT received, beginning system shutdown");
                    self.supervisor.request_system_shutdown();
                }

                result = self.uevent_socket.recv() => {
                    match result {
                        Ok(msg) => self.handle_uevent(msg).await,
                        Err(e) => tracing::warn!(error = %e, "uevent socket read failed"),
                    }
                }

                accepted = self.ipc_listener.accept() => {
                    match accepted {
                        Ok(session) => self.ipc_session = Some(session),
                        Err(e) => tracing::warn!(error = %e, "IPC accept failed"),
                    }
                }

                () = async {
                    if self.ipc_session.is_some() {
                        self.drain_ipc_session().await;
                    } else {
                        std::future::pending::<()>().await;
                    }
                } => {}

                Some(idx) = self.exit_watchers.next() => {
                    self.supervisor.handle_guest_exit(idx);
                    self.resync_dynamic_netifs().await;
                }

                Some(completion) = self.workqueue_rx.recv() => {
                    self.supervisor.handle_workqueue_completion(completion);
                }
            }
        }

        self.run_pipeline_to_completion(cm_config::host::PipelinePhase::Terminate).await;
        self.run_pipeline_to_completion(cm_config::host::PipelinePhase::TerminateExt).await;
    }
}

/// Bridges [`cm_workqueue::WorkqueueSlot`]'s `std::sync::mpsc` completion
/// channel into the async reactor: one blocking thread relays completions
/// onto a tokio channel the reactor's `select!` can await directly.
pub fn spawn_workqueue_bridge() -> (
    std::sync::mpsc::Sender<cm_workqueue::WorkqueueCompletion>,
    tokio::sync::mpsc::UnboundedReceiver<cm_workqueue::WorkqueueCompletion>,
) {
    let (std_tx, std_rx) = std::sync::mpsc::channel();
    let (tokio_tx, tokio_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::task::spawn_blocking(move || {
        while let Ok(completion) = std_rx.recv() {
            if tokio_tx.send(completion).is_err() {
                break;
            }
        }
    });
    (std_tx, tokio_rx)
}

