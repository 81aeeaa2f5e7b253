//! # richlink
//!
//! A Discord Rich Presence client over local IPC (Unix domain sockets on
//! Linux and macOS, named pipes on Windows).
//!
//! The client is poll-driven: a worker thread owns the pipe, connects and
//! reconnects with backoff, and transmits presence; peer events are queued
//! and handed to your handlers only when you call
//! [`RpcClient::run_callbacks`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use richlink::{EventHandlers, PresenceBuilder, RpcClient, RpcConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let handlers = EventHandlers::new()
//!     .on_ready(|user| println!("Connected as {}", user.username))
//!     .on_disconnected(|code, message| eprintln!("Disconnected ({code}): {message}"));
//!
//! let mut client = RpcClient::new(RpcConfig::default());
//! client.initialize("your_client_id", handlers, false, None)?;
//!
//! let presence = PresenceBuilder::new()
//!     .state("Playing a game")
//!     .details("In the menu")
//!     .start_timestamp_now()?
//!     .large_image("game_logo")
//!     .large_text("My Awesome Game")
//!     .build();
//! client.update_presence(&presence)?;
//!
//! for _ in 0..100 {
//!     client.run_callbacks();
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//!
//! client.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod encoder;
pub mod error;
pub mod ipc;
pub mod nonce;
pub mod presence;
pub mod register;
pub mod retry;
pub mod session;
pub mod transport;

pub use client::{PresenceHandle, RpcClient};
pub use config::{PipeConfig, RpcConfig};
pub use dispatch::{Event, EventHandlers, User};
pub use encoder::{JoinReply, OversizePolicy, PresenceEncoder};
pub use error::{ErrorCategory, Result, RpcError};
pub use ipc::{Frame, IpcTransport, Opcode};
pub use presence::{Activity, PresenceBuilder, RichPresence};
pub use retry::RetryConfig;
pub use session::ConnectionState;
pub use transport::Transport;
