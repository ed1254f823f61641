pub mod device;
pub mod disk;
pub mod fsmount;
pub mod idmap;
pub mod lifecycle;
pub mod netif;
pub mod resource;
pub mod rootfs;

use crate::error::ConfigError;
use device::DeviceConfig;
use disk::ExtraDisk;
use fsmount::FsConfig;
use idmap::IdMaps;
use lifecycle::{CapabilityConfig, LifecycleConfig, TtyConfig};
use netif::NetifConfig;
use resource::ResourceConfig;
use rootfs::RootfsConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fields carried over from the original base config struct that aren't
/// mechanical enough to live in their own submodule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    #[serde(default)]
    pub autoboot: bool,
    #[serde(default)]
    pub bootpriority: i32,
    pub rootfs: RootfsConfig,
    #[serde(default)]
    pub extradisk: Vec<ExtraDisk>,
    #[serde(default)]
    pub shmounts: Option<String>,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub cap: CapabilityConfig,
    #[serde(default)]
    pub tty: TtyConfig,
    #[serde(default)]
    pub idmaps: IdMaps,
    #[serde(default)]
    pub env: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guest {
    pub name: String,
    pub role: String,
    pub base: BaseConfig,
    #[serde(default)]
    pub resource: ResourceConfig,
    #[serde(default)]
    pub fs: FsConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub netif: NetifConfig,
}

impl Guest {
    /// Mandatory-field check applied after parse; a guest failing this check
    /// is skipped rather than aborting the whole fleet load.
    pub fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                path: path.to_path_buf(),
                field: "name",
            });
        }
        if self.role.trim().is_empty() {
            return Err(ConfigError::MissingField {
                path: path.to_path_buf(),
                field: "role",
            });
        }
        if self.base.rootfs.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField {
                path: path.to_path_buf(),
                field: "rootfs.path",
            });
        }
        if self.base.rootfs.fstype.trim().is_empty() {
            return Err(ConfigError::MissingField {
                path: path.to_path_buf(),
                field: "rootfs.fstype",
            });
        }
        if self.base.rootfs.blockdev.iter().all(|b| b.as_os_str().is_empty()) {
            return Err(ConfigError::MissingField {
                path: path.to_path_buf(),
                field: "rootfs.blockdev",
            });
        }
        Ok(())
    }
}
