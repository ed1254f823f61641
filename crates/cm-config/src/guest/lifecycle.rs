use serde::{Deserialize, Serialize};

fn default_signal() -> String {
    "SIGTERM".to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_signal")]
    pub halt: String,
    #[serde(default = "default_signal")]
    pub reboot: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        LifecycleConfig {
            halt: default_signal(),
            reboot: default_signal(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityConfig {
    #[serde(default)]
    pub drop: Vec<String>,
    #[serde(default)]
    pub keep: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TtyConfig {
    #[serde(default)]
    pub tty_max: u32,
    #[serde(default)]
    pub pty_max: u32,
}
