use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskMode {
    Ro,
    Rw,
}

/// Root filesystem mount for a guest. `blockdev` carries the primary and
/// (optional) secondary block device for A/B rootfs updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootfsConfig {
    pub path: PathBuf,
    pub fstype: String,
    pub mode: DiskMode,
    #[serde(default)]
    pub option: Option<String>,
    pub blockdev: [PathBuf; 2],
}
