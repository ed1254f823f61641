//! Per-guest workqueue slot state machine (§3 "Workqueue slot").
//!
//! Exactly one slot per guest; a guest cannot be relaunched while its slot
//! is `Scheduled` or `Started`.

use crate::plugin::{self, WorkerPlugin};
use cm_shared::{CmError, CmResult, GuestIndex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkqueueStatus {
    Disable,
    Inactive,
    Scheduled,
    Started,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostExecuteAction {
    Hold,
    Relaunch,
}

#[derive(Debug)]
pub struct WorkqueueCompletion {
    pub guest: GuestIndex,
    pub post_execute_action: PostExecuteAction,
    pub result: Result<(), String>,
}

pub struct WorkqueueSlot {
    guest: GuestIndex,
    status: WorkqueueStatus,
    post_execute_action: PostExecuteAction,
    cancel: Arc<AtomicBool>,
    result: Option<Result<(), String>>,
}

impl WorkqueueSlot {
    pub fn new(guest: GuestIndex) -> Self {
        WorkqueueSlot {
            guest,
            status: WorkqueueStatus::Disable,
            post_execute_action: PostExecuteAction::Hold,
            cancel: Arc::new(AtomicBool::new(false)),
            result: None,
        }
    }

    pub fn status(&self) -> WorkqueueStatus {
        self.status
    }

    pub fn result(&self) -> Option<&Result<(), String>> {
        self.result.as_ref()
    }

    /// Schedules `plugin_name` with `arg_str`, failing if the slot is
    /// already `Scheduled` or `Started`.
    pub fn schedule(
        &mut self,
        plugin_name: &str,
        arg_str: &str,
        launch_after_end: PostExecuteAction,
    ) -> CmResult<Box<dyn WorkerPlugin>> {
        if matches!(self.status, WorkqueueStatus::Scheduled | WorkqueueStatus::Started) {
            return Err(CmError::runtime(
                self.guest.to_string(),
                "workqueue slot is already scheduled or running",
            ));
        }
        let mut worker = plugin::lookup(plugin_name)
            .ok_or_else(|| CmError::NotFound(format!("worker plugin '{plugin_name}'")))?;
        worker.set_args(arg_str)?;
        self.status = WorkqueueStatus::Scheduled;
        self.post_execute_action = launch_after_end;
        self.cancel.store(false, Ordering::Release);
        self.result = None;
        Ok(worker)
    }

    /// Runs `worker` on a dedicated worker thread, reporting completion back
    /// through `completion_tx`. Marks the slot `Started` immediately and
    /// `Completed` once the thread finishes.
    pub fn run(&mut self, mut worker: Box<dyn WorkerPlugin>, completion_tx: Sender<WorkqueueCompletion>) {
        self.status = WorkqueueStatus::Started;
        let guest = self.guest;
        let post_execute_action = self.post_execute_action;
        let cancel = self.cancel.clone();

        std::thread::Builder::new()
            .name(format!("cm-workqueue-{}", guest.0))
            .spawn(move || {
                let result = worker.exec(&cancel).map_err(|e| e.to_string());
                let _ = completion_tx.send(WorkqueueCompletion {
                    guest,
                    post_execute_action,
                    result,
                });
            })
            .expect("failed to spawn workqueue worker thread");
    }

    /// Marks the slot `Completed` and records the result; called by the
    /// owner once it receives this slot's [`WorkqueueCompletion`].
    pub fn complete(&mut self, result: Result<(), String>) {
        self.status = WorkqueueStatus::Completed;
        self.result = Some(result);
    }

    /// `COMPLETED -> INACTIVE`: releases the slot so a later boot path could
    /// schedule it again. Called by the owner right after it has read
    /// `post_execute_action`/`result` off a just-completed slot.
    pub fn cleanup(&mut self) {
        if self.status == WorkqueueStatus::Completed {
            self.status = WorkqueueStatus::Inactive;
        }
    }

    /// Any state except `Started`/`Completed` -> `Inactive`.
    pub fn remove(&mut self) {
        if !matches!(self.status, WorkqueueStatus::Started | WorkqueueStatus::Completed) {
            self.status = WorkqueueStatus::Inactive;
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn post_execute_action(&self) -> PostExecuteAction {
        self.post_execute_action
    }
}
