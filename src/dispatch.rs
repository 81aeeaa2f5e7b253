//! Event queue and handler delivery
//!
//! The worker thread only ever pushes into [`EventQueue`]. Handlers run
//! exclusively inside [`RpcClient::run_callbacks`](crate::RpcClient::run_callbacks),
//! on the caller's thread, in arrival order.

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// The user the peer is logged in as, or who asked to join
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl User {
    /// Extract `data.user` from a dispatch payload
    pub fn from_dispatch(data: &Value) -> Option<Self> {
        data.get("user")
            .and_then(|user| serde_json::from_value(user.clone()).ok())
    }
}

/// Something the peer told us, waiting for the next `run_callbacks`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Ready(User),
    Disconnected { code: i32, message: String },
    Errored { code: i32, message: String },
    JoinGame(String),
    SpectateGame(String),
    JoinRequest(User),
}

type ReadyFn = Box<dyn FnMut(&User) + Send>;
type StatusFn = Box<dyn FnMut(i32, &str) + Send>;
type SecretFn = Box<dyn FnMut(&str) + Send>;
type RequestFn = Box<dyn FnMut(&User) + Send>;

/// Callbacks registered at initialization. Every slot is optional.
///
/// ```
/// use richlink::EventHandlers;
///
/// let handlers = EventHandlers::new()
///     .on_ready(|user| println!("ready as {}", user.username))
///     .on_disconnected(|code, message| eprintln!("lost peer: {code} {message}"));
/// assert!(!handlers.wants_join_game());
/// ```
#[derive(Default)]
pub struct EventHandlers {
    ready: Option<ReadyFn>,
    disconnected: Option<StatusFn>,
    errored: Option<StatusFn>,
    join_game: Option<SecretFn>,
    spectate_game: Option<SecretFn>,
    join_request: Option<RequestFn>,
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("ready", &self.ready.is_some())
            .field("disconnected", &self.disconnected.is_some())
            .field("errored", &self.errored.is_some())
            .field("join_game", &self.join_game.is_some())
            .field("spectate_game", &self.spectate_game.is_some())
            .field("join_request", &self.join_request.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// No handlers; every event is discarded
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the peer has accepted the handshake
    pub fn on_ready<F: FnMut(&User) + Send + 'static>(mut self, f: F) -> Self {
        self.ready = Some(Box::new(f));
        self
    }

    /// Called when the pipe to the peer is lost
    pub fn on_disconnected<F: FnMut(i32, &str) + Send + 'static>(mut self, f: F) -> Self {
        self.disconnected = Some(Box::new(f));
        self
    }

    /// Called for peer error responses and local failures
    pub fn on_errored<F: FnMut(i32, &str) + Send + 'static>(mut self, f: F) -> Self {
        self.errored = Some(Box::new(f));
        self
    }

    /// Called with the join secret when the user joins through the peer
    ///
    /// Registering it subscribes to `ACTIVITY_JOIN`.
    pub fn on_join_game<F: FnMut(&str) + Send + 'static>(mut self, f: F) -> Self {
        self.join_game = Some(Box::new(f));
        self
    }

    /// Called with the spectate secret when the user spectates through the peer
    pub fn on_spectate_game<F: FnMut(&str) + Send + 'static>(mut self, f: F) -> Self {
        self.spectate_game = Some(Box::new(f));
        self
    }

    /// Called when another user asks to join; answer with
    /// [`RpcClient::respond`](crate::RpcClient::respond)
    pub fn on_join_request<F: FnMut(&User) + Send + 'static>(mut self, f: F) -> Self {
        self.join_request = Some(Box::new(f));
        self
    }

    pub fn wants_join_game(&self) -> bool {
        self.join_game.is_some()
    }

    pub fn wants_spectate_game(&self) -> bool {
        self.spectate_game.is_some()
    }

    pub fn wants_join_request(&self) -> bool {
        self.join_request.is_some()
    }

    /// Invoke the handler for `event`, if one is registered
    pub fn deliver(&mut self, event: &Event) {
        match event {
            Event::Ready(user) => {
                if let Some(f) = self.ready.as_mut() {
                    f(user)
                }
            }
            Event::Disconnected { code, message } => {
                if let Some(f) = self.disconnected.as_mut() {
                    f(*code, message)
                }
            }
            Event::Errored { code, message } => {
                if let Some(f) = self.errored.as_mut() {
                    f(*code, message)
                }
            }
            Event::JoinGame(secret) => {
                if let Some(f) = self.join_game.as_mut() {
                    f(secret)
                }
            }
            Event::SpectateGame(secret) => {
                if let Some(f) = self.spectate_game.as_mut() {
                    f(secret)
                }
            }
            Event::JoinRequest(user) => {
                if let Some(f) = self.join_request.as_mut() {
                    f(user)
                }
            }
        }
    }
}

/// Bounded FIFO of pending events; the oldest event is dropped on overflow
#[derive(Debug)]
pub struct EventQueue {
    events: Mutex<VecDeque<Event>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, event: Event) {
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            if let Some(oldest) = events.pop_front() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("Event queue full, dropping {:?}", oldest);
            }
        }
        events.push_back(event);
    }

    /// Take every queued event, oldest first
    pub fn drain(&self) -> Vec<Event> {
        self.events.lock().drain(..).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
