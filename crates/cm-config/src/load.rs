//! Loading the host config and the per-guest fleet from a config directory.

use crate::error::{ConfigError, ConfigResult};
use crate::guest::Guest;
use crate::host::HostConfig;
use crate::role::{build_role_table, RoleTable};
use std::fs;
use std::path::Path;

/// Matches `CONTAINER_EXTIF_GUESTS_MAX` in the control protocol header.
pub const MAX_GUESTS: usize = 16;

pub fn load_host_config(path: &Path) -> ConfigResult<HostConfig> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|e| ConfigError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn load_guest_file(path: &Path) -> ConfigResult<Guest> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let guest: Guest = serde_json::from_str(&text).map_err(|e| ConfigError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    guest.validate(path)?;
    Ok(guest)
}

/// Parses every `*.json` file in `guest_dir`, skipping any single guest that
/// fails to parse or validate (logged at error level), sorts the survivors
/// by `bootpriority` ascending, truncates to [`MAX_GUESTS`] (logged at
/// critical level if truncation happens), and builds the role table.
///
/// Returns [`ConfigError::EmptyFleet`] if the directory yields zero usable
/// guests — a totally empty or totally broken guest directory aborts
/// startup rather than running with no guests at all.
pub fn load_fleet(guest_dir: &Path) -> ConfigResult<(Vec<Guest>, RoleTable)> {
    let mut guests = Vec::new();

    let entries = fs::read_dir(guest_dir).map_err(|source| ConfigError::Io {
        path: guest_dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(error = %e, dir = %guest_dir.display(), "failed to read directory entry");
                continue;
            }
        };
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match load_guest_file(&path) {
            Ok(guest) => guests.push(guest),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "skipping unusable guest config");
            }
        }
    }

    if guests.is_empty() {
        return Err(ConfigError::EmptyFleet(guest_dir.to_path_buf()));
    }

    guests.sort_by_key(|g| g.base.bootpriority);

    if guests.len() > MAX_GUESTS {
        cm_shared::log::critical_error(format!(
            "fleet has {} guests, exceeding the {} guest limit; excess guests ignored",
            guests.len(),
            MAX_GUESTS
        ));
        guests.truncate(MAX_GUESTS);
    }

    let roles = build_role_table(&guests);
    Ok((guests, roles))
}
