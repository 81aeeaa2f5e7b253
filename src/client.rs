use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::RpcConfig;
use crate::dispatch::{Event, EventHandlers};
use crate::encoder::{JoinReply, PresenceEncoder};
use crate::error::{codes, Result, RpcError};
use crate::ipc::IpcTransport;
use crate::presence::RichPresence;
use crate::register::{default_registrar, LauncherRegistrar};
use crate::session::{ConnectionState, PresenceUpdate, Session, Shared, Subscriptions};
use crate::transport::Transport;

type TransportFactory = Box<dyn FnMut(&RpcConfig) -> Box<dyn Transport> + Send>;

/// Rich Presence client
///
/// Lifecycle: [`initialize`](Self::initialize) once, publish presence as
/// often as needed, call [`run_callbacks`](Self::run_callbacks) regularly,
/// and [`shutdown`](Self::shutdown) (or drop the client) when done.
/// Connecting, retrying and transmitting happen on a worker thread; none
/// of these calls block on the peer.
///
/// ```no_run
/// use richlink::{EventHandlers, RpcClient, RpcConfig};
///
/// # fn main() -> richlink::Result {
/// let mut client = RpcClient::new(RpcConfig::default());
/// client.initialize(
///     "your_client_id",
///     EventHandlers::new().on_ready(|user| println!("connected as {}", user.username)),
///     false,
///     None,
/// )?;
///
/// client.draft_mut().state = Some("Testing!".into());
/// client.draft_mut().details = Some("Presence in Rust".into());
/// client.publish()?;
///
/// loop {
///     client.run_callbacks();
///     std::thread::sleep(std::time::Duration::from_millis(100));
/// #   break;
/// }
/// # Ok(())
/// # }
/// ```
pub struct RpcClient {
    config: RpcConfig,
    encoder: PresenceEncoder,
    shared: Arc<Shared>,
    handlers: EventHandlers,
    draft: RichPresence,
    registrar: Box<dyn LauncherRegistrar>,
    transports: TransportFactory,
    worker: Option<JoinHandle<()>>,
}

impl RpcClient {
    /// Client over the platform IPC pipe
    pub fn new(config: RpcConfig) -> Self {
        Self::with_transport_factory(config, |config: &RpcConfig| {
            Box::new(IpcTransport::new(config)) as Box<dyn Transport>
        })
    }

    /// Client whose sessions use transports built by `factory`
    ///
    /// The factory runs once per `initialize`.
    pub fn with_transport_factory<F>(config: RpcConfig, factory: F) -> Self
    where
        F: FnMut(&RpcConfig) -> Box<dyn Transport> + Send + 'static,
    {
        Self {
            encoder: PresenceEncoder::new(config.oversize),
            shared: Arc::new(Shared::new(config.queue_capacity)),
            config,
            handlers: EventHandlers::new(),
            draft: RichPresence::default(),
            registrar: default_registrar(),
            transports: Box::new(factory),
            worker: None,
        }
    }

    /// Replace the OS integration used for `auto_register`
    pub fn with_registrar<R: LauncherRegistrar + 'static>(mut self, registrar: R) -> Self {
        self.registrar = Box::new(registrar);
        self
    }

    /// Create a client over the platform pipe and initialize it
    pub fn start<S: Into<String>>(
        application_id: S,
        handlers: EventHandlers,
        config: RpcConfig,
    ) -> Result<Self> {
        let mut client = Self::new(config);
        client.initialize(application_id, handlers, false, None)?;
        Ok(client)
    }

    /// The configuration this client was created with
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Current connection state, as last seen by the worker
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Open a session to the peer
    ///
    /// Returns immediately; the connection is made in the background and
    /// reported through the `ready` handler. With `auto_register`, the
    /// launcher is registered with the OS first; a registration failure is
    /// reported through `errored` and does not stop the session.
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` if a session is live, `InvalidConfig` for an
    /// empty application id or invalid configuration.
    pub fn initialize<S: Into<String>>(
        &mut self,
        application_id: S,
        handlers: EventHandlers,
        auto_register: bool,
        steam_id: Option<&str>,
    ) -> Result {
        let application_id = application_id.into();
        if application_id.trim().is_empty() {
            return Err(RpcError::InvalidConfig("application id is empty".into()));
        }
        self.config.validate()?;

        {
            let mut state = self.shared.state.lock();
            if state.is_live() {
                return Err(RpcError::AlreadyInitialized);
            }
            *state = ConnectionState::Connecting;
        }

        // Fresh session: nothing from a previous one carries over
        self.shared.events.clear();
        *self.shared.outbox.lock() = Default::default();
        self.shared.stop.store(false, Ordering::Release);

        let subscriptions = Subscriptions {
            join_game: handlers.wants_join_game(),
            spectate_game: handlers.wants_spectate_game(),
            join_request: handlers.wants_join_request(),
        };
        self.handlers = handlers;

        if auto_register {
            if let Err(err) = self.registrar.register_launcher(&application_id, steam_id) {
                log::warn!("{}", err);
                self.shared.events.push(Event::Errored {
                    code: codes::REGISTRATION_FAILED,
                    message: err.to_string(),
                });
            }
        }

        let transport = (self.transports)(&self.config);
        let session = Session::new(
            transport,
            self.shared.clone(),
            application_id.clone(),
            self.config.clone(),
            subscriptions,
        );

        let spawned = std::thread::Builder::new()
            .name(format!("richlink-{}", application_id))
            .spawn(move || session.run());

        match spawned {
            Ok(handle) => {
                log::debug!("Initialized session for {}", application_id);
                self.worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                *self.shared.state.lock() = ConnectionState::Uninitialized;
                Err(RpcError::Io(err))
            }
        }
    }

    /// Queue `presence` for transmission
    ///
    /// Validation happens here, synchronously; transmission is left to the
    /// worker, which sends only the latest queued presence and no more
    /// often than the configured debounce. While the peer is not ready the
    /// presence is kept and sent once it is.
    ///
    /// # Errors
    ///
    /// `Encoding` if a field is over its limit under
    /// [`OversizePolicy::Reject`](crate::OversizePolicy::Reject), and
    /// `NotConnected` before `initialize` or after `shutdown`.
    pub fn update_presence(&self, presence: &RichPresence) -> Result {
        let activity = self.encoder.encode(presence)?;
        submit(&self.shared, PresenceUpdate::Set(activity))
    }

    /// Clear the presence shown by the peer
    pub fn clear_presence(&mut self) -> Result {
        submit(&self.shared, PresenceUpdate::Clear)?;
        self.draft = RichPresence::default();
        Ok(())
    }

    /// The presence being edited; changes take effect on [`publish`](Self::publish)
    pub fn draft(&self) -> &RichPresence {
        &self.draft
    }

    /// Mutable access to the draft; nothing is sent until `publish`
    pub fn draft_mut(&mut self) -> &mut RichPresence {
        &mut self.draft
    }

    /// Transmit the draft as one update
    pub fn publish(&self) -> Result {
        self.update_presence(&self.draft)
    }

    /// A cloneable handle for updating presence from other threads
    pub fn presence_handle(&self) -> PresenceHandle {
        PresenceHandle {
            shared: self.shared.clone(),
            encoder: self.encoder,
        }
    }

    /// Answer a join request received through the `join_request` handler
    pub fn respond(&self, user_id: &str, reply: JoinReply) -> Result {
        let state = self.shared.state.lock();
        if !state.is_live() {
            return Err(RpcError::NotConnected);
        }
        self.shared
            .outbox
            .lock()
            .replies
            .push_back((user_id.to_string(), reply));
        drop(state);
        self.shared.wake();
        Ok(())
    }

    /// Deliver queued events to the registered handlers
    ///
    /// Never blocks. Events are delivered in the order they arrived, on the
    /// calling thread. Returns how many were delivered.
    pub fn run_callbacks(&mut self) -> usize {
        if !self.state().is_live() {
            return 0;
        }
        let events = self.shared.events.drain();
        for event in &events {
            self.handlers.deliver(event);
        }
        events.len()
    }

    /// Number of events discarded because the queue overflowed
    pub fn dropped_events(&self) -> u64 {
        self.shared.events.dropped()
    }

    /// Stop the worker, cancel pending retries and close the pipe
    ///
    /// Safe to call any number of times. Undelivered events are discarded.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.shared.state.lock();
            if *state == ConnectionState::ShutDown {
                return;
            }
            *state = ConnectionState::ShutDown;
        }

        self.shared.stop.store(true, Ordering::Release);
        self.shared.wake();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("Worker thread panicked");
            }
        }

        self.shared.events.clear();
        *self.shared.outbox.lock() = Default::default();
        log::debug!("Client shut down");
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Updates presence of an [`RpcClient`] from any thread
#[derive(Clone)]
pub struct PresenceHandle {
    shared: Arc<Shared>,
    encoder: PresenceEncoder,
}

impl PresenceHandle {
    /// Same as [`RpcClient::update_presence`]
    pub fn update_presence(&self, presence: &RichPresence) -> Result {
        let activity = self.encoder.encode(presence)?;
        submit(&self.shared, PresenceUpdate::Set(activity))
    }

    /// Same as [`RpcClient::clear_presence`], without touching the draft
    pub fn clear_presence(&self) -> Result {
        submit(&self.shared, PresenceUpdate::Clear)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }
}

/// Store `update` as the pending presence unless the client is down.
/// The state lock is held across the store so a racing shutdown either
/// sees the update cleared or the update sees `ShutDown`.
fn submit(shared: &Shared, update: PresenceUpdate) -> Result {
    let state = shared.state.lock();
    if !state.is_live() {
        return Err(RpcError::NotConnected);
    }
    shared.outbox.lock().presence = Some(update);
    drop(state);
    shared.wake();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipeConfig;
    use crate::register::NoopRegistrar;

    fn offline_client() -> RpcClient {
        let path = format!("/nonexistent/richlink-{}", std::process::id());
        RpcClient::new(RpcConfig::default().with_pipe(PipeConfig::CustomPath(path)))
            .with_registrar(NoopRegistrar)
    }

    #[test]
    fn update_before_initialize_is_not_connected() {
        let client = offline_client();
        assert_eq!(client.state(), ConnectionState::Uninitialized);
        let presence = RichPresence::builder().state("x").build();
        assert!(matches!(
            client.update_presence(&presence),
            Err(RpcError::NotConnected)
        ));
    }

    #[test]
    fn encoding_errors_win_over_state_errors() {
        let client = offline_client();
        let presence = RichPresence::builder().state("x".repeat(129)).build();
        assert!(matches!(
            client.update_presence(&presence),
            Err(RpcError::Encoding { field: "state", .. })
        ));
    }

    #[test]
    fn empty_application_id_is_rejected() {
        let mut client = offline_client();
        assert!(matches!(
            client.initialize("  ", EventHandlers::new(), false, None),
            Err(RpcError::InvalidConfig(_))
        ));
        assert_eq!(client.state(), ConnectionState::Uninitialized);
    }

    #[test]
    fn second_initialize_is_rejected() {
        let mut client = offline_client();
        client
            .initialize("app1", EventHandlers::new(), false, None)
            .unwrap();
        assert!(matches!(
            client.initialize("app1", EventHandlers::new(), false, None),
            Err(RpcError::AlreadyInitialized)
        ));
        client.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent_and_reinitialize_works() {
        let mut client = offline_client();
        client
            .initialize("app1", EventHandlers::new(), false, None)
            .unwrap();
        client.shutdown();
        client.shutdown();
        assert_eq!(client.state(), ConnectionState::ShutDown);
        assert!(matches!(
            client.presence_handle().clear_presence(),
            Err(RpcError::NotConnected)
        ));

        client
            .initialize("app1", EventHandlers::new(), false, None)
            .unwrap();
        assert_eq!(client.state(), ConnectionState::Connecting);
    }

    #[test]
    fn failed_registration_is_reported_as_event() {
        struct Failing;
        impl LauncherRegistrar for Failing {
            fn register_launcher(&self, _: &str, _: Option<&str>) -> Result {
                Err(RpcError::Registration("denied".into()))
            }
        }

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut client = offline_client().with_registrar(Failing);
        client
            .initialize(
                "app1",
                EventHandlers::new().on_errored(move |code, msg| sink.lock().push((code, msg.to_string()))),
                true,
                None,
            )
            .unwrap();

        assert_eq!(client.run_callbacks(), 1);
        let seen = seen.lock();
        assert_eq!(seen[0].0, codes::REGISTRATION_FAILED);
        assert!(seen[0].1.contains("denied"));
    }
}
