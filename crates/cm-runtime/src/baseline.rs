//! The baseline cgroup device allow list applied to every guest that has
//! `enable_protection` set (§4.3). Major/minor numbers are the fixed Linux
//! assignments for these device nodes.

use crate::devspec::{DevKind, DeviceSpec};

pub fn baseline_allowlist() -> Vec<DeviceSpec> {
    vec![
        DeviceSpec::new(DevKind::Char, 1, Some(3), "rwm"), // null
        DeviceSpec::new(DevKind::Char, 1, Some(5), "rwm"), // zero
        DeviceSpec::new(DevKind::Char, 1, Some(7), "rwm"), // full
        DeviceSpec::new(DevKind::Char, 5, Some(0), "rwm"), // tty
        DeviceSpec::new(DevKind::Char, 5, Some(2), "rwm"), // ptmx
        DeviceSpec::new(DevKind::Char, 1, Some(8), "rwm"), // random
        DeviceSpec::new(DevKind::Char, 1, Some(9), "rwm"), // urandom
        DeviceSpec::new(DevKind::Char, 136, None, "rwm"),  // pts/*
    ]
}
