use crate::error::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame opcodes of the IPC protocol
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl TryFrom<u32> for Opcode {
    type Error = RpcError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Opcode::Handshake),
            1 => Ok(Opcode::Frame),
            2 => Ok(Opcode::Close),
            3 => Ok(Opcode::Ping),
            4 => Ok(Opcode::Pong),
            _ => Err(RpcError::Protocol(format!("Invalid opcode value: {}", value))),
        }
    }
}

impl From<Opcode> for u32 {
    fn from(opcode: Opcode) -> Self {
        opcode as u32
    }
}

/// Commands carried in the `cmd` field of a FRAME payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Dispatch,
    SetActivity,
    Subscribe,
    SendActivityJoinInvite,
    CloseActivityRequest,
}

/// Event names carried in the `evt` field of a FRAME payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventName {
    Ready,
    Error,
    ActivityJoin,
    ActivitySpectate,
    ActivityJoinRequest,
}

/// Outgoing command payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcMessage {
    pub cmd: Command,
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evt: Option<EventName>,
    pub nonce: String,
}

/// Handshake payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub v: u32,
    pub client_id: String,
}

/// Incoming FRAME payload
///
/// Unknown commands and events are kept as raw strings so a newer peer
/// does not break decoding.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpcResponse {
    pub cmd: Option<String>,
    pub evt: Option<String>,
    #[serde(default)]
    pub data: Value,
    pub nonce: Option<String>,
}

impl IpcResponse {
    /// The event name, if it is one we know
    pub fn event(&self) -> Option<EventName> {
        self.evt
            .as_deref()
            .and_then(|evt| serde_json::from_value(Value::String(evt.to_string())).ok())
    }

    /// `(code, message)` from an ERROR event's data
    pub fn error_detail(&self) -> (i32, String) {
        close_detail(&self.data)
    }
}

/// `(code, message)` from a CLOSE payload or an ERROR event's data
pub fn close_detail(value: &Value) -> (i32, String) {
    let code = value
        .get("code")
        .and_then(Value::as_i64)
        .and_then(|c| i32::try_from(c).ok())
        .unwrap_or(0);
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    (code, message)
}

/// Constants of the IPC protocol
pub mod constants {
    /// Protocol version sent in the handshake
    pub const IPC_VERSION: u32 = 1;

    /// Number of numbered pipes (`discord-ipc-0` .. `discord-ipc-9`) to scan
    pub const MAX_IPC_SOCKETS: u8 = 10;

    /// Pipe name prefix
    pub const IPC_SOCKET_PREFIX: &str = "discord-ipc-";

    /// Upper bound on a single payload (16 MB)
    ///
    /// Presence payloads are well under 1 KB; anything larger means the
    /// stream is out of sync.
    pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

    /// `u32` opcode + `u32` length, both little-endian
    pub const IPC_HEADER_SIZE: usize = 8;
}
