use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsMountType {
    /// Pseudo filesystem mount (tmpfs, proc-like); never used for disks.
    Filesystem,
    /// Bind mount from host to guest, applied at `create_instance` time.
    Directory,
    /// Bind mount applied later, once the source path appears (C4 tracks it).
    Delayed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsMountEntry {
    #[serde(rename = "type")]
    pub mount_type: FsMountType,
    pub from: PathBuf,
    pub to: PathBuf,
    #[serde(default)]
    pub fstype: Option<String>,
    #[serde(default)]
    pub option: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FsConfig {
    #[serde(default)]
    pub mounts: Vec<FsMountEntry>,
}

impl FsConfig {
    pub fn immediate(&self) -> impl Iterator<Item = &FsMountEntry> {
        self.mounts
            .iter()
            .filter(|m| m.mount_type != FsMountType::Delayed)
    }

    pub fn delayed(&self) -> impl Iterator<Item = &FsMountEntry> {
        self.mounts
            .iter()
            .filter(|m| m.mount_type == FsMountType::Delayed)
    }
}
