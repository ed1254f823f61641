//! `fsck` worker plugin: runs `fsck.ext4 -p <device>` and polls for
//! cancellation every 100ms while it waits for the child.

use crate::plugin::{PluginFactory, WorkerPlugin};
use cm_shared::{CmError, CmResult};
use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct FsckPlugin {
    device: Option<String>,
}

impl WorkerPlugin for FsckPlugin {
    fn name(&self) -> &'static str {
        "fsck"
    }

    fn set_args(&mut self, arg_str: &str) -> CmResult<()> {
        if arg_str.trim().is_empty() {
            return Err(CmError::Invariant("fsck plugin requires a device path argument".into()));
        }
        self.device = Some(arg_str.trim().to_string());
        Ok(())
    }

    fn exec(&mut self, cancel: &AtomicBool) -> CmResult<()> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| CmError::Invariant("fsck plugin executed with no device set".into()))?;

        let mut child = Command::new("fsck.ext4")
            .arg("-p")
            .arg(device)
            .spawn()
            .map_err(CmError::Io)?;

        wait_with_cancellation(&mut child, cancel)
    }
}

/// Shared by `fsck`/`erase`: poll the child every 100ms so a cancellation
/// request is noticed quickly instead of blocking on `wait()`.
pub(crate) fn wait_with_cancellation(child: &mut Child, cancel: &AtomicBool) -> CmResult<()> {
    loop {
        if cancel.load(Ordering::Acquire) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CmError::Invariant("cancelled".into()));
        }
        match child.try_wait().map_err(CmError::Io)? {
            Some(status) if status.success() => return Ok(()),
            Some(status) => return Err(CmError::Invariant(format!("child exited with {status}"))),
            None => std::thread::sleep(Duration::from_millis(100)),
        }
    }
}

inventory::submit! {
    PluginFactory {
        name: "fsck",
        create: || Box::new(FsckPlugin::default()),
    }
}
