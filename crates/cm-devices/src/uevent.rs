//! Parsing of `NETLINK_KOBJECT_UEVENT` messages.
//!
//! Kernel uevents arrive as a NUL-separated sequence of strings: the first
//! is `ACTION@DEVPATH`, the rest are `KEY=VALUE` pairs (`udev(7)`).

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct UeventMessage {
    pub action: String,
    pub devpath: String,
    pub subsystem: Option<String>,
    pub devtype: Option<String>,
    pub devname: Option<String>,
    pub major: Option<u32>,
    pub minor: Option<u32>,
    /// Every `KEY=VALUE` pair, including ones already pulled out above, so
    /// callers that need a field we didn't special-case (e.g. for uevent
    /// re-injection) still have it.
    pub fields: HashMap<String, String>,
}

impl UeventMessage {
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let mut parts = raw.split(|&b| b == 0).filter(|s| !s.is_empty());

        let header = std::str::from_utf8(parts.next()?).ok()?;
        let (action, devpath) = header.split_once('@')?;

        let mut fields = HashMap::new();
        for part in parts {
            let s = std::str::from_utf8(part).ok()?;
            if let Some((k, v)) = s.split_once('=') {
                fields.insert(k.to_string(), v.to_string());
            }
        }

        Some(UeventMessage {
            action: action.to_string(),
            devpath: devpath.to_string(),
            subsystem: fields.get("SUBSYSTEM").cloned(),
            devtype: fields.get("DEVTYPE").cloned(),
            devname: fields.get("DEVNAME").cloned(),
            major: fields.get("MAJOR").and_then(|s| s.parse().ok()),
            minor: fields.get("MINOR").and_then(|s| s.parse().ok()),
            fields,
        })
    }

    /// Rebuilds the `@<path>\0KEY=VALUE\0…\0` wire form used both for the
    /// original message and for re-injection into a guest's netns, skipping
    /// `SEQNUM` and rewriting `DEVNAME` to strip any leading `/dev/`.
    pub fn reencode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(format!("{}@{}", self.action, self.devpath).as_bytes());
        out.push(0);
        for (key, value) in &self.fields {
            if key == "SEQNUM" {
                continue;
            }
            if key == "DEVNAME" {
                let trimmed = value.strip_prefix("/dev/").unwrap_or(value);
                out.extend_from_slice(format!("DEVNAME={trimmed}").as_bytes());
            } else {
                out.extend_from_slice(format!("{key}={value}").as_bytes());
            }
            out.push(0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_add_event() {
        let mut raw = b"add@/devices/platform/gpio\0ACTION=add\0DEVPATH=/devices/platform/gpio\0SUBSYSTEM=gpio\0MAJOR=254\0MINOR=0\0SEQNUM=123\0".to_vec();
        raw.push(0); // trailing NUL is common, parser must tolerate it
        let msg = UeventMessage::parse(&raw).unwrap();
        assert_eq!(msg.action, "add");
        assert_eq!(msg.subsystem.as_deref(), Some("gpio"));
        assert_eq!(msg.major, Some(254));
    }

    #[test]
    fn reencode_strips_seqnum_and_dev_prefix() {
        let raw = b"add@/devices/x\0ACTION=add\0DEVNAME=/dev/ttyS0\0SEQNUM=7\0".to_vec();
        let msg = UeventMessage::parse(&raw).unwrap();
        let out = msg.reencode();
        let out_str = String::from_utf8_lossy(&out);
        assert!(out_str.contains("DEVNAME=ttyS0"));
        assert!(!out_str.contains("SEQNUM"));
    }
}
