use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UeventActionMask {
    #[serde(default)]
    pub add: bool,
    #[serde(default)]
    pub remove: bool,
    #[serde(default)]
    pub change: bool,
    #[serde(default)]
    pub r#move: bool,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub bind: bool,
    #[serde(default)]
    pub unbind: bool,
}

impl UeventActionMask {
    pub fn matches(&self, action: &str) -> bool {
        match action {
            "add" => self.add,
            "remove" => self.remove,
            "change" => self.change,
            "move" => self.r#move,
            "online" => self.online,
            "offline" => self.offline,
            "bind" => self.bind,
            "unbind" => self.unbind,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpioDirection {
    DontCare,
    In,
    Out,
    Low,
    High,
}

/// One host-to-guest static device binding, tagged by the kind of node it
/// produces. Matches `DEVICE_TYPE_{DEVNODE,DEVDIR,GPIO,IIO}` from the
/// original device config, flattened into an enum instead of a tagged union
/// with an internal `type` discriminant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StaticDevice {
    DevNode {
        from: PathBuf,
        to: PathBuf,
        devnode: PathBuf,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        wideallow: bool,
        #[serde(default)]
        exclusive: bool,
    },
    DevDir {
        from: PathBuf,
        to: PathBuf,
        #[serde(default)]
        optional: bool,
        #[serde(default)]
        wideallow: bool,
        #[serde(default)]
        exclusive: bool,
    },
    Gpio {
        port: u32,
        #[serde(default = "default_gpio_direction")]
        direction: GpioDirection,
        from: PathBuf,
        to: PathBuf,
    },
    Iio {
        sysfrom: PathBuf,
        systo: PathBuf,
        devfrom: PathBuf,
        devto: PathBuf,
        devnode: PathBuf,
        #[serde(default)]
        optional: bool,
    },
}

fn default_gpio_direction() -> GpioDirection {
    GpioDirection::DontCare
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceBehavior {
    #[serde(default)]
    pub inject_uevent: bool,
    #[serde(default)]
    pub create_devnode: bool,
    #[serde(default)]
    pub allow_via_cgroup: bool,
    #[serde(default = "default_permission")]
    pub permission: String,
}

fn default_permission() -> String {
    "rw".to_string()
}

/// One entry of a guest's dynamic device rule list; matched in config order
/// against incoming kernel uevents, first match wins (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicDeviceRule {
    pub devpath_prefix: String,
    pub subsystem: String,
    #[serde(default)]
    pub action: UeventActionMask,
    #[serde(default)]
    pub devtype_allowlist: Option<Vec<String>>,
    pub behavior: DeviceBehavior,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub enable_protection: bool,
    #[serde(default)]
    pub static_devices: Vec<StaticDevice>,
    #[serde(default)]
    pub dynamic_rules: Vec<DynamicDeviceRule>,
}
