use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IdMap {
    /// id as seen inside the guest, typically 0.
    pub guest_root_id: u32,
    pub host_start_id: u32,
    pub num_of_id: u32,
}

/// Idmaps are enabled iff both `uid` and `gid` are present in the source
/// JSON; a guest with no idmap section runs unmapped (privileged container).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IdMaps {
    pub enabled: bool,
    pub uid: IdMap,
    pub gid: IdMap,
}
