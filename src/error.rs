use std::io;
use thiserror::Error;

/// Error codes carried by `Disconnected` / `Errored` events when the
/// failure originates on our side of the pipe.
///
/// Codes sent by the peer in a CLOSE or ERROR payload are passed through
/// untouched, so these stay in a small range the peer does not use.
pub mod codes {
    /// The pipe was closed or a write/read on it failed
    pub const PIPE_CLOSED: i32 = 1;
    /// The peer sent bytes that could not be decoded as a frame
    pub const READ_CORRUPT: i32 = 2;
    /// The peer accepted the connection but never sent READY
    pub const HANDSHAKE_TIMEOUT: i32 = 3;
    /// Launcher registration with the OS failed
    pub const REGISTRATION_FAILED: i32 = 4;
}

/// Errors that can occur while talking to the Rich Presence peer
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Client is already initialized; call shutdown() first")]
    AlreadyInitialized,

    #[error("Client is not connected")]
    NotConnected,

    #[error("Field `{field}` is {actual} bytes, limit is {limit}")]
    Encoding {
        field: &'static str,
        limit: usize,
        actual: usize,
    },

    #[error("Transport error {code}: {message}")]
    Transport { code: i32, message: String },

    #[error("I/O error on IPC pipe")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Failed to serialize JSON payload")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Launcher registration failed: {0}")]
    Registration(String),
}

/// Coarse classification of an [`RpcError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Pipe could not be opened, or broke while in use
    Connection,
    /// The peer sent something we could not make sense of
    Protocol,
    /// The caller handed us something invalid
    Input,
    /// The client was used in the wrong lifecycle state
    Lifecycle,
    /// OS integration (launcher registration)
    Platform,
}

impl RpcError {
    /// Build a transport error from a code and message
    pub fn transport<S: Into<String>>(code: i32, message: S) -> Self {
        RpcError::Transport {
            code,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RpcError::Transport { .. } | RpcError::Io(_) => ErrorCategory::Connection,
            RpcError::Protocol(_) | RpcError::Serialization(_) => ErrorCategory::Protocol,
            RpcError::Encoding { .. } | RpcError::InvalidConfig(_) => ErrorCategory::Input,
            RpcError::AlreadyInitialized | RpcError::NotConnected => ErrorCategory::Lifecycle,
            RpcError::Registration(_) => ErrorCategory::Platform,
        }
    }

    /// Whether this error came from the pipe itself
    pub fn is_connection_error(&self) -> bool {
        self.category() == ErrorCategory::Connection
    }

    /// Whether a fresh connection attempt may succeed where this one failed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Connection | ErrorCategory::Protocol
        )
    }

    /// Numeric code reported to `disconnected`/`errored` handlers
    pub fn code(&self) -> i32 {
        match self {
            RpcError::Transport { code, .. } => *code,
            RpcError::Protocol(_) | RpcError::Serialization(_) => codes::READ_CORRUPT,
            RpcError::Registration(_) => codes::REGISTRATION_FAILED,
            _ => codes::PIPE_CLOSED,
        }
    }
}

/// Result type for Rich Presence operations
pub type Result<T = ()> = std::result::Result<T, RpcError>;
