//! Host-level config: the config directory itself, the bridge list used by
//! static veth interfaces, and the optional manager work pipeline table
//! consumed by the storage worker (C6).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Start,
    Terminate,
    TerminateExt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineTaskType {
    Mount,
    Fsck,
    Mkfs,
    Unmount,
    Erase,
}

/// One entry of the manager-wide storage pipeline table (§4.6). The same
/// table is reused across phases; only entries whose `phase_mask`
/// intersects the phase being dispatched run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEntry {
    pub task_type: PipelineTaskType,
    pub phase_mask: Vec<PipelinePhase>,
    pub device_path: PathBuf,
    #[serde(default)]
    pub mountpoint: Option<PathBuf>,
    #[serde(default)]
    pub fs_options: Option<String>,
    #[serde(default)]
    pub mount_flags: Option<String>,
}

impl PipelineEntry {
    pub fn runs_in(&self, phase: PipelinePhase) -> bool {
        self.phase_mask.contains(&phase)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub config_dir: PathBuf,
    #[serde(default)]
    pub bridges: Vec<String>,
    #[serde(default)]
    pub pipeline: Vec<PipelineEntry>,
}
