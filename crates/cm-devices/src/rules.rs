//! Device-rule matching engine (§4.4 step 2-3).

use crate::uevent::UeventMessage;
use cm_config::guest::device::DynamicDeviceRule;

/// Does `rule` match `uevent`? Config order + "first match wins" is the
/// caller's responsibility — this only answers yes/no for one rule.
pub fn rule_matches(rule: &DynamicDeviceRule, uevent: &UeventMessage) -> bool {
    if !uevent.devpath.starts_with(&rule.devpath_prefix) {
        return false;
    }
    if uevent.subsystem.as_deref() != Some(rule.subsystem.as_str()) {
        return false;
    }
    if !rule.action.matches(&uevent.action) {
        return false;
    }
    if let Some(allowlist) = &rule.devtype_allowlist {
        match &uevent.devtype {
            Some(devtype) => {
                if !allowlist.iter().any(|d| d == devtype) {
                    return false;
                }
            }
            None => return false,
        }
    }
    true
}

/// Finds the first guest (in iteration order) with a device rule matching
/// `uevent`, and the matching rule itself.
pub fn find_match<'a, I, G>(guests: I, uevent: &UeventMessage) -> Option<(G, &'a DynamicDeviceRule)>
where
    I: IntoIterator<Item = (G, &'a [DynamicDeviceRule])>,
{
    for (guest, rules) in guests {
        if let Some(rule) = rules.iter().find(|r| rule_matches(r, uevent)) {
            return Some((guest, rule));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_config::guest::device::{DeviceBehavior, UeventActionMask};

    fn rule(prefix: &str, subsystem: &str) -> DynamicDeviceRule {
        DynamicDeviceRule {
            devpath_prefix: prefix.to_string(),
            subsystem: subsystem.to_string(),
            action: UeventActionMask {
                add: true,
                ..Default::default()
            },
            devtype_allowlist: None,
            behavior: DeviceBehavior::default(),
        }
    }

    fn uevent(devpath: &str, subsystem: &str, action: &str) -> UeventMessage {
        let raw = format!("{action}@{devpath}\0ACTION={action}\0DEVPATH={devpath}\0SUBSYSTEM={subsystem}\0");
        UeventMessage::parse(raw.as_bytes()).unwrap()
    }

    #[test]
    fn matches_on_prefix_subsystem_and_action() {
        let r = rule("/devices/platform/gpio", "gpio");
        let ev = uevent("/devices/platform/gpio/gpio3", "gpio", "add");
        assert!(rule_matches(&r, &ev));
    }

    #[test]
    fn rejects_wrong_action() {
        let r = rule("/devices/platform/gpio", "gpio");
        let ev = uevent("/devices/platform/gpio/gpio3", "gpio", "remove");
        assert!(!rule_matches(&r, &ev));
    }

    #[test]
    fn first_match_wins() {
        let r1 = vec![rule("/devices/platform/gpio", "gpio")];
        let r2 = vec![rule("/devices/platform/gpio", "gpio")];
        let ev = uevent("/devices/platform/gpio/gpio3", "gpio", "add");
        let guests = vec![("a", r1.as_slice()), ("b", r2.as_slice())];
        let (winner, _) = find_match(guests, &ev).unwrap();
        assert_eq!(winner, "a");
    }
}
