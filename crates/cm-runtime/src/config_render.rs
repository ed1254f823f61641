//! Renders a guest's [`cm_config::Guest`] into an `lxc.container.conf(5)`
//! text file. This is the practical way to set the large cross-product of
//! config liblxc exposes (rootfs, mounts, caps, idmap, cgroups, prlimits,
//! sysctls, netifs) without hand-maintaining FFI bindings for every
//! individual `set_config_item` call liblxc supports.

use crate::baseline::baseline_allowlist;
use cm_config::guest::device::StaticDevice;
use cm_config::guest::fsmount::FsMountType;
use cm_config::guest::netif::StaticNetif;
use cm_config::guest::resource::ResourceKind;
use cm_config::Guest;
use std::fmt::Write as _;

pub fn render(guest: &Guest) -> String {
    let mut out = String::new();

    writeln!(out, "lxc.rootfs.path = {}", guest.base.rootfs.path.display()).unwrap();
    if let Some(opt) = &guest.base.rootfs.option {
        writeln!(out, "lxc.rootfs.options = {opt}").unwrap();
    }

    writeln!(out, "lxc.signal.halt = {}", guest.base.lifecycle.halt).unwrap();
    writeln!(out, "lxc.signal.reboot = {}", guest.base.lifecycle.reboot).unwrap();

    if !guest.base.cap.drop.is_empty() {
        writeln!(out, "lxc.cap.drop = {}", guest.base.cap.drop.join(" ")).unwrap();
    }
    if !guest.base.cap.keep.is_empty() {
        writeln!(out, "lxc.cap.keep = {}", guest.base.cap.keep.join(" ")).unwrap();
    }

    if guest.base.tty.tty_max > 0 {
        writeln!(out, "lxc.tty.max = {}", guest.base.tty.tty_max).unwrap();
    }
    if guest.base.tty.pty_max > 0 {
        writeln!(out, "lxc.pty.max = {}", guest.base.tty.pty_max).unwrap();
    }

    if guest.base.idmaps.enabled {
        let uid = &guest.base.idmaps.uid;
        let gid = &guest.base.idmaps.gid;
        writeln!(
            out,
            "lxc.idmap = u {} {} {}",
            uid.guest_root_id, uid.host_start_id, uid.num_of_id
        )
        .unwrap();
        writeln!(
            out,
            "lxc.idmap = g {} {} {}",
            gid.guest_root_id, gid.host_start_id, gid.num_of_id
        )
        .unwrap();
    }

    // Automount set: cgroup, proc, sys always; shmounts only if configured.
    // Works unchanged on cgroup v1 and v2 hosts.
    let mut automount = vec!["proc:mixed", "sys:ro", "cgroup:mixed"];
    if guest.base.shmounts.is_some() {
        automount.push("shmounts:mixed");
    }
    writeln!(out, "lxc.mount.auto = {}", automount.join(" ")).unwrap();

    // Which of blockdev[A]/blockdev[B] actually gets mounted onto `from` is
    // decided by the manager's storage pipeline (C6) before the guest is
    // started; `create_instance` only bind-mounts the already-mounted host
    // path into the guest.
    for disk in &guest.base.extradisk {
        writeln!(
            out,
            "lxc.mount.entry = {} {} none bind,create=dir,optional 0 0",
            disk.from.display(),
            disk.to.display()
        )
        .unwrap();
    }

    for mount in guest.fs.immediate() {
        if mount.mount_type == FsMountType::Filesystem {
            continue; // pseudo-fs entries are handled by lxc.mount.auto above
        }
        writeln!(
            out,
            "lxc.mount.entry = {} {} none bind,create=dir,optional 0 0",
            mount.from.display(),
            mount.to.display()
        )
        .unwrap();
    }

    for device in &guest.device.static_devices {
        render_static_device(&mut out, device);
    }

    for entry in &guest.resource.entries {
        match entry.kind {
            ResourceKind::CgroupV1 => {
                writeln!(
                    out,
                    "lxc.cgroup.{}.{} = {}",
                    entry.controller_or_path, entry.key, entry.value
                )
                .unwrap();
            }
            ResourceKind::CgroupV2 => {
                writeln!(out, "lxc.cgroup2.{} = {}", entry.key, entry.value).unwrap();
            }
            ResourceKind::Prlimit => {
                writeln!(out, "lxc.prlimit.{} = {}", entry.key, entry.value).unwrap();
            }
            ResourceKind::Sysctl => {
                writeln!(out, "lxc.sysctl.{} = {}", entry.key, entry.value).unwrap();
            }
        }
    }

    if guest.device.enable_protection {
        writeln!(out, "lxc.cgroup.devices.deny = a").unwrap();
        for spec in baseline_allowlist() {
            writeln!(out, "lxc.cgroup.devices.allow = {spec}").unwrap();
        }
    }

    for (idx, netif) in guest.netif.static_netif.iter().enumerate() {
        let StaticNetif::Veth(veth) = netif;
        writeln!(out, "lxc.net.{idx}.type = veth").unwrap();
        writeln!(out, "lxc.net.{idx}.name = {}", veth.name).unwrap();
        if let Some(link) = &veth.link {
            writeln!(out, "lxc.net.{idx}.link = {link}").unwrap();
        }
        if let Some(flags) = &veth.flags {
            writeln!(out, "lxc.net.{idx}.flags = {flags}").unwrap();
        }
        if let Some(hwaddr) = &veth.hwaddr {
            writeln!(out, "lxc.net.{idx}.hwaddr = {hwaddr}").unwrap();
        }
        if let Some(address) = &veth.address {
            writeln!(out, "lxc.net.{idx}.ipv4.address = {address}").unwrap();
        }
        if let Some(gateway) = &veth.gateway {
            writeln!(out, "lxc.net.{idx}.ipv4.gateway = {gateway}").unwrap();
        }
    }

    out
}

fn render_static_device(out: &mut String, device: &StaticDevice) {
    match device {
        StaticDevice::DevNode { from, to, .. } => {
            writeln!(
                out,
                "lxc.mount.entry = {} {} none bind,optional,create=file 0 0",
                from.display(),
                to.display()
            )
            .unwrap();
        }
        StaticDevice::DevDir { from, to, .. } => {
            writeln!(
                out,
                "lxc.mount.entry = {} {} none bind,optional,create=dir 0 0",
                from.display(),
                to.display()
            )
            .unwrap();
        }
        // gpio/iio nodes are exported and bound by the device engine (C4)
        // once the guest namespace exists; the base lxc config only needs
        // the devnode/devdir bind entries above.
        StaticDevice::Gpio { .. } | StaticDevice::Iio { .. } => {}
    }
}
