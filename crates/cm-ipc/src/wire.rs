//! Wire protocol for the control IPC endpoint (§4.8, §6).
//!
//! Struct layouts and command/response codes are taken verbatim from
//! `container-manager-interface.h`: little-endian fixed structs, one
//! request per datagram, one response per datagram, max payload 8 KiB.

use cm_shared::{CmError, CmResult};

pub const STR_LEN_MAX: usize = 128;
/// `CONTAINER_EXTIF_GUESTS_MAX` (`8*2`).
pub const GUESTS_MAX: usize = 16;
pub const COMMAND_BUFSIZE_MAX: usize = 8 * 1024;

pub const CMD_GETGUESTS: u32 = 0x1000;
pub const CMD_LIFECYCLE_BY_NAME: u32 = 0x2000;
pub const CMD_LIFECYCLE_BY_ROLE: u32 = 0x2001;
pub const CMD_CHANGE_ACTIVE_BY_NAME: u32 = 0x3000;

pub const SUB_SHUTDOWN: u32 = 1;
pub const SUB_REBOOT: u32 = 2;
pub const SUB_FORCEREBOOT: u32 = 3;

pub const RESP_GETGUESTS: u32 = 0xa1000;
pub const RESP_LIFECYCLE: u32 = 0xa2000;
pub const RESP_CHANGE: u32 = 0xa3000;

pub const GUEST_STATUS_DISABLE: i32 = -1;
pub const GUEST_STATUS_NOT_STARTED: i32 = 0;
pub const GUEST_STATUS_STARTED: i32 = 1;
pub const GUEST_STATUS_SHUTDOWN: i32 = 2;
pub const GUEST_STATUS_DEAD: i32 = 3;
pub const GUEST_STATUS_EXIT: i32 = 4;

pub const LIFECYCLE_ACCEPT: i32 = 0;
pub const LIFECYCLE_NONAME: i32 = -1;
pub const LIFECYCLE_NOROLE: i32 = -2;
pub const LIFECYCLE_ERROR: i32 = -100;

pub const CHANGE_ACCEPT: i32 = 0;
pub const CHANGE_NONAME: i32 = -1;
pub const CHANGE_ERROR: i32 = -100;

#[derive(Debug, Clone)]
pub struct GuestInfo {
    pub name: String,
    pub role: String,
    pub status: i32,
}

#[derive(Debug, Clone)]
pub enum Request {
    GetGuests,
    LifecycleByName { subcommand: u32, target: String },
    LifecycleByRole { subcommand: u32, target: String },
    ChangeActiveByName { target: String },
}

#[derive(Debug, Clone)]
pub enum Response {
    Guests(Vec<GuestInfo>),
    Lifecycle(i32),
    Change(i32),
}

fn pack_str(s: &str) -> [u8; STR_LEN_MAX] {
    let mut buf = [0u8; STR_LEN_MAX];
    let bytes = s.as_bytes();
    let n = bytes.len().min(STR_LEN_MAX - 1);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

fn unpack_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn read_u32(buf: &[u8], offset: usize) -> CmResult<u32> {
    let slice: [u8; 4] = buf
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| CmError::Protocol("undersized datagram".into()))?;
    Ok(u32::from_le_bytes(slice))
}

/// Decodes one request datagram. Undersized or unknown-command datagrams
/// are protocol errors (§7 error #5): the caller drops the session silently.
pub fn decode_request(buf: &[u8]) -> CmResult<Request> {
    if buf.len() > COMMAND_BUFSIZE_MAX {
        return Err(CmError::Protocol("datagram exceeds 8KiB".into()));
    }
    let command = read_u32(buf, 0)?;
    match command {
        CMD_GETGUESTS => Ok(Request::GetGuests),
        CMD_LIFECYCLE_BY_NAME | CMD_LIFECYCLE_BY_ROLE => {
            let subcommand = read_u32(buf, 4)?;
            let name_bytes = buf
                .get(8..8 + STR_LEN_MAX)
                .ok_or_else(|| CmError::Protocol("undersized lifecycle request".into()))?;
            let target = unpack_str(name_bytes);
            if command == CMD_LIFECYCLE_BY_NAME {
                Ok(Request::LifecycleByName { subcommand, target })
            } else {
                Ok(Request::LifecycleByRole { subcommand, target })
            }
        }
        CMD_CHANGE_ACTIVE_BY_NAME => {
            let name_bytes = buf
                .get(4..4 + STR_LEN_MAX)
                .ok_or_else(|| CmError::Protocol("undersized change-active request".into()))?;
            Ok(Request::ChangeActiveByName {
                target: unpack_str(name_bytes),
            })
        }
        other => Err(CmError::Protocol(format!("unknown command 0x{other:x}"))),
    }
}

/// Encodes one response datagram.
pub fn encode_response(resp: &Response) -> Vec<u8> {
    match resp {
        Response::Guests(guests) => {
            let mut out = Vec::with_capacity(4 + GUESTS_MAX * (STR_LEN_MAX * 2 + 4) + 4);
            out.extend_from_slice(&RESP_GETGUESTS.to_le_bytes());
            let n = guests.len().min(GUESTS_MAX);
            for g in &guests[..n] {
                out.extend_from_slice(&pack_str(&g.name));
                out.extend_from_slice(&pack_str(&g.role));
                out.extend_from_slice(&g.status.to_le_bytes());
            }
            // Pad unused guest slots with zeroed entries so the struct has
            // a fixed total size, matching the C array-of-16 layout.
            for _ in n..GUESTS_MAX {
                out.extend_from_slice(&[0u8; STR_LEN_MAX]);
                out.extend_from_slice(&[0u8; STR_LEN_MAX]);
                out.extend_from_slice(&0i32.to_le_bytes());
            }
            out.extend_from_slice(&(n as i32).to_le_bytes());
            out
        }
        Response::Lifecycle(code) => {
            let mut out = Vec::with_capacity(8);
            out.extend_from_slice(&RESP_LIFECYCLE.to_le_bytes());
            out.extend_from_slice(&code.to_le_bytes());
            out
        }
        Response::Change(code) => {
            let mut out = Vec::with_capacity(8);
            out.extend_from_slice(&RESP_CHANGE.to_le_bytes());
            out.extend_from_slice(&code.to_le_bytes());
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle_request_bytes(command: u32, subcommand: u32, name: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&command.to_le_bytes());
        buf.extend_from_slice(&subcommand.to_le_bytes());
        buf.extend_from_slice(&pack_str(name));
        buf
    }

    #[test]
    fn decodes_getguests() {
        let buf = CMD_GETGUESTS.to_le_bytes().to_vec();
        assert!(matches!(decode_request(&buf), Ok(Request::GetGuests)));
    }

    #[test]
    fn decodes_lifecycle_by_name() {
        let buf = lifecycle_request_bytes(CMD_LIFECYCLE_BY_NAME, SUB_SHUTDOWN, "g0");
        match decode_request(&buf).unwrap() {
            Request::LifecycleByName { subcommand, target } => {
                assert_eq!(subcommand, SUB_SHUTDOWN);
                assert_eq!(target, "g0");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_unknown_command() {
        let buf = 0xdeadu32.to_le_bytes().to_vec();
        assert!(decode_request(&buf).is_err());
    }

    #[test]
    fn rejects_undersized_datagram() {
        let buf = vec![0u8; 2];
        assert!(decode_request(&buf).is_err());
    }

    #[test]
    fn encodes_guest_list_with_count() {
        let resp = Response::Guests(vec![GuestInfo {
            name: "g0".into(),
            role: "ivi".into(),
            status: GUEST_STATUS_STARTED,
        }]);
        let bytes = encode_response(&resp);
        let num_offset = bytes.len() - 4;
        let num = i32::from_le_bytes(bytes[num_offset..].try_into().unwrap());
        assert_eq!(num, 1);
    }
}
