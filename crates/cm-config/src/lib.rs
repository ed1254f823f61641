//! Config model: host-level settings plus the per-guest fleet.
//!
//! Parses the host JSON file and every per-guest JSON file in the config
//! directory, sorts guests by `bootpriority`, and builds the role table
//! that the supervisor (C7) uses to pick each role's active candidate.

pub mod error;
pub mod guest;
pub mod host;
pub mod load;
pub mod role;

pub use error::{ConfigError, ConfigResult};
pub use guest::Guest;
pub use host::HostConfig;
pub use load::{load_fleet, load_host_config, MAX_GUESTS};
pub use role::{build_role_table, RoleTable};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn guest_json(name: &str, role: &str, bootpriority: i32, autoboot: bool) -> String {
        format!(
            r#"{{
                "name": "{name}",
                "role": "{role}",
                "base": {{
                    "autoboot": {autoboot},
                    "bootpriority": {bootpriority},
                    "rootfs": {{
                        "path": "/var/lib/cm/{name}/rootfs",
                        "fstype": "ext4",
                        "mode": "rw",
                        "blockdev": ["/dev/disk/by-partlabel/{name}-a", ""]
                    }}
                }}
            }}"#
        )
    }

    #[test]
    fn loads_and_sorts_by_bootpriority_and_builds_roles() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("b.json")).unwrap();
        write!(f, "{}", guest_json("b", "ivi", 2, false)).unwrap();
        let mut f = std::fs::File::create(dir.path().join("a.json")).unwrap();
        write!(f, "{}", guest_json("a", "ivi", 1, true)).unwrap();

        let (guests, roles) = load_fleet(dir.path()).expect("fleet should load");
        assert_eq!(guests.len(), 2);
        assert_eq!(guests[0].name, "a");
        assert_eq!(guests[1].name, "b");

        let ivi = roles.get(&cm_shared::RoleName::from("ivi")).unwrap();
        assert_eq!(ivi[0], cm_shared::GuestIndex(0));
    }

    #[test]
    fn empty_directory_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_fleet(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyFleet(_)));
    }

    #[test]
    fn missing_rootfs_block_device_skips_guest_not_whole_fleet() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("broken.json")).unwrap();
        write!(
            f,
            r#"{{"name": "broken", "role": "ivi", "base": {{"rootfs": {{"path": "/x", "fstype": "ext4", "mode": "rw", "blockdev": ["", ""]}}}}}}"#
        )
        .unwrap();
        let mut f = std::fs::File::create(dir.path().join("good.json")).unwrap();
        write!(f, "{}", guest_json("good", "ivi", 1, false)).unwrap();

        let (guests, _) = load_fleet(dir.path()).expect("fleet should load");
        assert_eq!(guests.len(), 1);
        assert_eq!(guests[0].name, "good");
    }

    #[test]
    fn autoboot_guest_heads_its_role_entry_regardless_of_bootpriority() {
        let guests: Vec<Guest> = vec![
            serde_json::from_str(&guest_json("low-pri-autoboot", "cluster", 5, true)).unwrap(),
            serde_json::from_str(&guest_json("high-pri-fallback", "cluster", 1, false)).unwrap(),
        ];
        let roles = build_role_table(&guests);
        let cluster = roles.get(&cm_shared::RoleName::from("cluster")).unwrap();
        assert_eq!(guests[cluster[0].0].name, "low-pri-autoboot");
    }
}
