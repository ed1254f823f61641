//! Stable index handles.
//!
//! The original C implementation threads raw `container_config_t*` pointers
//! through role lists and device rule lists (intrusive doubly-linked lists).
//! The rewrite replaces every such pointer with a `GuestIndex` into a flat
//! `Vec<Guest>` owned by the supervisor — cheap to copy, trivially `Send`,
//! and immune to the aliasing problems a pointer-based design would hit
//! once config and runtime state are split (see DESIGN.md, item 2).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GuestIndex(pub usize);

impl fmt::Display for GuestIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleName(pub String);

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoleName {
    fn from(s: &str) -> Self {
        RoleName(s.to_string())
    }
}

impl From<String> for RoleName {
    fn from(s: String) -> Self {
        RoleName(s)
    }
}
