//! Runtime engine / LXC adapter (§4.3): turns a parsed [`cm_config::Guest`]
//! into a running container and exposes the narrow set of operations the
//! supervisor needs against it.

pub mod baseline;
pub mod config_render;
pub mod devspec;
pub mod lxc;
pub mod traits;

pub use devspec::{CgroupDeviceAction, DevKind, DeviceSpec};
pub use traits::{ContainerHandle, ContainerRuntime};

#[cfg(test)]
mod tests {
    use super::*;
    use cm_config::guest::netif::{StaticNetif, VethConfig};

    fn minimal_guest() -> cm_config::Guest {
        serde_json::from_str(
            r#"{
                "name": "ivi-main",
                "role": "ivi",
                "base": {
                    "rootfs": {
                        "path": "/var/lib/cm/ivi-main/rootfs",
                        "fstype": "ext4",
                        "mode": "rw",
                        "blockdev": ["/dev/disk/by-partlabel/ivi-a", ""]
                    }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn renders_rootfs_and_signals() {
        let guest = minimal_guest();
        let text = config_render::render(&guest);
        assert!(text.contains("lxc.rootfs.path = /var/lib/cm/ivi-main/rootfs"));
        assert!(text.contains("lxc.signal.halt = SIGTERM"));
    }

    #[test]
    fn renders_baseline_allowlist_only_when_protection_enabled() {
        let mut guest = minimal_guest();
        let text = config_render::render(&guest);
        assert!(!text.contains("lxc.cgroup.devices.deny"));

        guest.device.enable_protection = true;
        let text = config_render::render(&guest);
        assert!(text.contains("lxc.cgroup.devices.deny = a"));
        assert!(text.contains("lxc.cgroup.devices.allow = c 1:3 rwm"));
    }

    #[test]
    fn renders_static_veth() {
        let mut guest = minimal_guest();
        guest.netif.static_netif.push(StaticNetif::Veth(VethConfig {
            name: "eth0".to_string(),
            link: Some("br-ivi".to_string()),
            flags: Some("up".to_string()),
            hwaddr: None,
            mode: None,
            address: Some("10.0.0.2/24".to_string()),
            gateway: Some("10.0.0.1".to_string()),
        }));
        let text = config_render::render(&guest);
        assert!(text.contains("lxc.net.0.type = veth"));
        assert!(text.contains("lxc.net.0.name = eth0"));
        assert!(text.contains("lxc.net.0.ipv4.gateway = 10.0.0.1"));
    }

    #[test]
    fn device_spec_renders_wildcard_minor() {
        let spec = DeviceSpec::new(DevKind::Char, 136, None, "rwm");
        assert_eq!(spec.to_string(), "c 136:* rwm");
    }
}
