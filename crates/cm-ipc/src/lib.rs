//! Control IPC endpoint (C8, §4.8): an abstract UNIX seqpacket socket
//! speaking the fixed little-endian command/response protocol documented in
//! §6.

pub mod socket;
pub mod wire;

pub use socket::{IpcListener, IpcSession, SOCKET_NAME};
pub use wire::{decode_request, encode_response, GuestInfo, Request, Response};
