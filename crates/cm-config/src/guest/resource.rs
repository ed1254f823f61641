use serde::{Deserialize, Serialize};

/// Resource controls applied to the guest's namespace before start, in
/// config order. `CgroupV1` entries name a controller (`devices`, `cpu`, …)
/// in `controller_or_path`; `CgroupV2` entries name the unified-hierarchy
/// file relative to the guest's cgroup directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    CgroupV1,
    CgroupV2,
    Prlimit,
    Sysctl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub kind: ResourceKind,
    pub controller_or_path: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub entries: Vec<ResourceEntry>,
}
