//! Device specs used by the cgroup device allow/deny path (C3/C4 boundary).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevKind {
    Char,
    Block,
}

impl DevKind {
    /// Selects `c` vs `b` the same way the hot-plug engine does: `block` ->
    /// `b`, anything else -> `c`.
    pub fn from_subsystem(subsystem: &str) -> Self {
        if subsystem == "block" {
            DevKind::Block
        } else {
            DevKind::Char
        }
    }

    fn letter(self) -> char {
        match self {
            DevKind::Char => 'c',
            DevKind::Block => 'b',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupDeviceAction {
    Allow,
    Deny,
}

/// A `devices.{allow,deny}` entry: `<type> <major>:<minor> <permission>`.
/// `minor: None` renders as `*` (wildcard minor).
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    pub kind: DevKind,
    pub major: u32,
    pub minor: Option<u32>,
    pub permission: String,
}

impl DeviceSpec {
    pub fn new(kind: DevKind, major: u32, minor: Option<u32>, permission: impl Into<String>) -> Self {
        DeviceSpec {
            kind,
            major,
            minor,
            permission: permission.into(),
        }
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minor = self
            .minor
            .map(|m| m.to_string())
            .unwrap_or_else(|| "*".to_string());
        write!(
            f,
            "{} {}:{} {}",
            self.kind.letter(),
            self.major,
            minor,
            self.permission
        )
    }
}
