//! Client configuration

use std::time::Duration;

use crate::encoder::OversizePolicy;
use crate::error::{Result, RpcError};
use crate::ipc::constants;
use crate::retry::RetryConfig;

/// Which pipe to open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PipeConfig {
    /// Scan the standard locations for `discord-ipc-{0..N}`
    #[default]
    Auto,
    /// Open exactly this path
    CustomPath(String),
}

/// Configuration for an [`RpcClient`](crate::RpcClient)
///
/// ```
/// use richlink::{OversizePolicy, RpcConfig};
/// use std::time::Duration;
///
/// let config = RpcConfig::default()
///     .with_oversize_policy(OversizePolicy::Truncate)
///     .with_debounce(Duration::from_millis(100));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub pipe: PipeConfig,

    /// Number of numbered pipes to scan during auto-discovery
    pub max_sockets: u8,

    /// Largest payload accepted from the peer, in bytes
    pub max_payload_size: u32,

    /// Protocol version sent in the handshake
    pub ipc_version: u32,

    /// Backoff between connection attempts
    pub retry: RetryConfig,

    /// How long to wait for READY after the pipe opens
    pub handshake_timeout: Duration,

    /// Minimum spacing between two transmitted presence frames
    pub debounce: Duration,

    /// Worker tick interval
    pub poll_interval: Duration,

    /// Capacity of the event queue drained by `run_callbacks`
    pub queue_capacity: usize,

    /// What to do with string fields over their byte limit
    pub oversize: OversizePolicy,

    /// Reconnect after the peer goes away
    pub auto_reconnect: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            pipe: PipeConfig::Auto,
            max_sockets: constants::MAX_IPC_SOCKETS,
            max_payload_size: constants::MAX_PAYLOAD_SIZE,
            ipc_version: constants::IPC_VERSION,
            retry: RetryConfig::default(),
            handshake_timeout: Duration::from_secs(5),
            debounce: Duration::from_millis(250),
            poll_interval: Duration::from_millis(20),
            queue_capacity: 64,
            oversize: OversizePolicy::Reject,
            auto_reconnect: true,
        }
    }
}

impl RpcConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the first three pipes, quicker retries and no debounce
    ///
    /// Useful when the peer is known to be running.
    pub fn fast_connect() -> Self {
        Self {
            max_sockets: 3,
            retry: RetryConfig::new(None, 100, 5_000, 2.0),
            debounce: Duration::ZERO,
            ..Default::default()
        }
    }

    /// Set which pipe to open
    pub fn with_pipe(mut self, pipe: PipeConfig) -> Self {
        self.pipe = pipe;
        self
    }

    /// Set how many numbered pipes auto-discovery scans
    pub fn with_max_sockets(mut self, max_sockets: u8) -> Self {
        self.max_sockets = max_sockets;
        self
    }

    /// Set the largest payload accepted from the peer
    pub fn with_max_payload_size(mut self, max_payload_size: u32) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// Set the reconnect backoff
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set how long to wait for READY
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the minimum spacing between presence frames
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the worker tick interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the event queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set what happens to fields over their byte limit
    pub fn with_oversize_policy(mut self, policy: OversizePolicy) -> Self {
        self.oversize = policy;
        self
    }

    /// Enable or disable reconnecting after the peer goes away
    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Check that every parameter is within a usable range
    pub fn validate(&self) -> Result {
        let invalid = |reason: &str| Err(RpcError::InvalidConfig(reason.to_string()));

        if self.max_sockets == 0 {
            return invalid("max_sockets must be greater than 0");
        }
        if self.max_sockets > 100 {
            return invalid("max_sockets exceeds reasonable limit (100)");
        }
        if self.max_payload_size < 1024 {
            return invalid("max_payload_size too small (minimum 1 KB)");
        }
        if self.max_payload_size > 100 * 1024 * 1024 {
            return invalid("max_payload_size too large (maximum 100 MB)");
        }
        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be greater than 0");
        }
        if self.poll_interval.is_zero() {
            return invalid("poll_interval must be greater than 0");
        }
        if self.handshake_timeout.is_zero() {
            return invalid("handshake_timeout must be greater than 0");
        }
        if let PipeConfig::CustomPath(path) = &self.pipe {
            if path.is_empty() {
                return invalid("custom pipe path is empty");
            }
        }
        if let Err(reason) = self.retry.validate() {
            return invalid(reason);
        }
        Ok(())
    }
}
