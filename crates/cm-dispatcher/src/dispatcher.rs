//! Host-side handle onto the manager-wide storage pipeline's worker thread
//! (§4.6, §5 "at most one *detached* worker thread (C6 manager pipeline)").

use crate::protocol::{self, ControlResponse, SocketPair};
use crate::worker::{self, RuntimeEntry};
use cm_config::host::{PipelineEntry, PipelinePhase};
use cm_shared::{CmError, CmResult};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::thread::JoinHandle;

/// A running (or just-finished) phase dispatch. Exists for the lifetime of
/// one phase's worker thread; [`Dispatcher`] holds at most one at a time
/// (invariant P5: `cmop.storage` is non-null iff a worker thread exists).
pub struct DispatchHandle {
    host_fd: Option<OwnedFd>,
    join: Option<JoinHandle<()>>,
}

impl DispatchHandle {
    /// Raw fd the caller should register with its reactor for readability;
    /// `None` once [`cancel`](Self::cancel) has torn the handle down.
    pub fn host_fd(&self) -> Option<RawFd> {
        self.host_fd.as_ref().map(|fd| fd.as_raw_fd())
    }

    /// Reads the next completion message, if one is pending. `Ok(None)`
    /// means the worker has hung up its end (phase fully drained and the
    /// thread is exiting).
    pub fn recv(&self) -> CmResult<Option<ControlResponse>> {
        match self.host_fd() {
            Some(fd) => protocol::recv_response(fd),
            None => Ok(None),
        }
    }

    /// One-way hang-up of the control socket (§4.6 cancellation): dropping
    /// the host's fd end is itself the cancel signal, observed by the
    /// worker as a zero-length read.
    pub fn cancel(&mut self) {
        self.host_fd.take();
    }

    pub fn join(mut self) {
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map(|j| j.is_finished()).unwrap_or(true)
    }
}

/// Spawns the single worker thread for `phase`, running every entry of
/// `entries` whose `phase_mask` includes it, in table order.
pub fn spawn(phase: PipelinePhase, entries: Vec<PipelineEntry>) -> CmResult<DispatchHandle> {
    let SocketPair { host, worker: worker_fd } = protocol::seqpacket_pair()?;

    let join = std::thread::Builder::new()
        .name("cm-dispatcher-worker".to_string())
        .spawn(move || {
            let mut runtime_entries: Vec<RuntimeEntry> = entries
                .iter()
                .enumerate()
                .map(|(i, entry)| RuntimeEntry {
                    entry,
                    index: i as i32,
                    error_count: 0,
                })
                .collect();
            worker::run_phase(&worker_fd, phase, &mut runtime_entries);
        })
        .map_err(|e| CmError::Invariant(format!("failed to spawn dispatcher worker thread: {e}")))?;

    Ok(DispatchHandle {
        host_fd: Some(host),
        join: Some(join),
    })
}

/// Owns the at-most-one in-flight dispatch. The supervisor (C7) calls
/// [`Dispatcher::dispatch`] once per phase transition and polls the
/// returned fd (wrapped in its own reactor's `AsyncFd`) for completion.
#[derive(Default)]
pub struct Dispatcher {
    current: Option<DispatchHandle>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    /// Starts `phase` if no phase is currently in flight. Returns an error
    /// if one already is — the caller should wait for completion first.
    pub fn dispatch(&mut self, phase: PipelinePhase, entries: Vec<PipelineEntry>) -> CmResult<RawFd> {
        if self.current.is_some() {
            return Err(CmError::Invariant(
                "a storage pipeline phase is already in flight".into(),
            ));
        }
        let handle = spawn(phase, entries)?;
        let fd = handle.host_fd().expect("freshly spawned handle always has a host fd");
        self.current = Some(handle);
        Ok(fd)
    }

    pub fn recv(&mut self) -> CmResult<Option<ControlResponse>> {
        match &self.current {
            Some(h) => h.recv(),
            None => Ok(None),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(h) = &mut self.current {
            h.cancel();
        }
    }

    /// Call once the worker has reported `OP_PHASE_DONE` (or hung up) to
    /// release the slot and join the thread.
    pub fn finish(&mut self) {
        if let Some(h) = self.current.take() {
            h.join();
        }
    }
}
