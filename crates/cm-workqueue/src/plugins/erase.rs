//! `erase` worker plugin: discards (TRIMs) a block device with `blkdiscard`,
//! same cancellation polling as `fsck`.

use super::fsck::wait_with_cancellation;
use crate::plugin::{PluginFactory, WorkerPlugin};
use cm_shared::{CmError, CmResult};
use std::process::Command;
use std::sync::atomic::AtomicBool;

#[derive(Default)]
pub struct EraseWorkerPlugin {
    device: Option<String>,
}

impl WorkerPlugin for EraseWorkerPlugin {
    fn name(&self) -> &'static str {
        "erase"
    }

    fn set_args(&mut self, arg_str: &str) -> CmResult<()> {
        if arg_str.trim().is_empty() {
            return Err(CmError::Invariant("erase plugin requires a device path argument".into()));
        }
        self.device = Some(arg_str.trim().to_string());
        Ok(())
    }

    fn exec(&mut self, cancel: &AtomicBool) -> CmResult<()> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| CmError::Invariant("erase plugin executed with no device set".into()))?;

        let mut child = Command::new("blkdiscard")
            .arg(device)
            .spawn()
            .map_err(CmError::Io)?;

        wait_with_cancellation(&mut child, cancel)
    }
}

inventory::submit! {
    PluginFactory {
        name: "erase",
        create: || Box::new(EraseWorkerPlugin::default()),
    }
}
