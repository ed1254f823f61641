//! Role table construction (§3 "Role entry").
//!
//! Exactly one role entry per distinct role string; within an entry the
//! `autoboot` guest sits at the head (the active candidate), everything
//! else follows in bootpriority order as fallbacks.

use crate::guest::Guest;
use cm_shared::{GuestIndex, RoleName};
use std::collections::HashMap;

pub type RoleTable = HashMap<RoleName, Vec<GuestIndex>>;

/// Build the role table from a guest list that has already been sorted by
/// `bootpriority` ascending.
pub fn build_role_table(guests: &[Guest]) -> RoleTable {
    let mut table: RoleTable = HashMap::new();

    for (idx, guest) in guests.iter().enumerate() {
        let entry = table.entry(RoleName::from(guest.role.as_str())).or_default();
        if guest.base.autoboot {
            entry.insert(0, GuestIndex(idx));
        } else {
            entry.push(GuestIndex(idx));
        }
    }

    table
}
