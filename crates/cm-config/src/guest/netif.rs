use serde::{Deserialize, Serialize};

/// Static veth endpoint created for a guest at `create_instance` time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VethConfig {
    pub name: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub flags: Option<String>,
    #[serde(default)]
    pub hwaddr: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StaticNetif {
    Veth(VethConfig),
}

/// Dynamic binding type for a host network interface handed into a guest's
/// namespace at hot-plug time. `Vxcan` supplements the original's veth-only
/// dynamic binding with SocketCAN virtual-CAN pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicIfType {
    Veth,
    Vxcan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicNetif {
    pub ifname: String,
    #[serde(default = "default_iftype")]
    pub iftype: DynamicIfType,
}

fn default_iftype() -> DynamicIfType {
    DynamicIfType::Veth
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetifConfig {
    #[serde(default)]
    pub static_netif: Vec<StaticNetif>,
    #[serde(default)]
    pub dynamic_netif: Vec<DynamicNetif>,
}
