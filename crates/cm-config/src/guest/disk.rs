use super::rootfs::DiskMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Recovery strategy applied when mounting an extra disk fails.
///
/// `Fsck`/`Mkfs` reuse the same recovery tool invocations as the manager's
/// own storage pipeline (C6): `fsck.ext4 -p` and `mkfs.ext4` respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskRedundancy {
    Failover,
    Ab,
    Fsck,
    Mkfs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraDisk {
    pub from: PathBuf,
    pub to: PathBuf,
    pub fstype: String,
    pub mode: DiskMode,
    #[serde(default)]
    pub option: Option<String>,
    pub redundancy: DiskRedundancy,
    pub blockdev: [PathBuf; 2],
}
