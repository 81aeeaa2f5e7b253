//! IPC plumbing: frame format, protocol vocabulary and the platform pipe

pub mod codec;
pub mod connection;
pub mod protocol;

pub use codec::{Frame, FrameDecoder};
pub use connection::{DiscoveredPipe, IpcTransport};
pub use protocol::{constants, Command, EventName, HandshakePayload, IpcMessage, IpcResponse, Opcode};
