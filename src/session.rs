//! Connection manager
//!
//! A [`Session`] owns the transport for one initialized client. It is
//! driven by [`Session::tick`], called periodically from the worker
//! thread; each tick connects when a retry is due, reads whatever the
//! peer sent, and flushes the outbox once the handshake has completed.
//! Nothing here calls user code: peer events go into the shared
//! [`EventQueue`].

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::Thread;
use std::time::Instant;

use crate::config::RpcConfig;
use crate::dispatch::{Event, EventQueue, User};
use crate::encoder::{self, JoinReply};
use crate::error::{codes, RpcError};
use crate::ipc::protocol::close_detail;
use crate::ipc::{EventName, Frame, IpcResponse, Opcode};
use crate::nonce::generate_nonce;
use crate::presence::Activity;
use crate::retry::Backoff;
use crate::transport::Transport;

/// Lifecycle of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Ready,
    Disconnected,
    ShutDown,
}

impl ConnectionState {
    /// Initialized and not yet shut down
    pub fn is_live(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Ready | ConnectionState::Disconnected
        )
    }
}

/// A presence change waiting to be transmitted
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PresenceUpdate {
    Set(Activity),
    Clear,
}

impl PresenceUpdate {
    fn activity(&self) -> Option<&Activity> {
        match self {
            PresenceUpdate::Set(activity) => Some(activity),
            PresenceUpdate::Clear => None,
        }
    }
}

/// Work handed from the caller to the worker
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    /// Only the latest update matters; a newer one replaces it
    pub presence: Option<PresenceUpdate>,
    pub replies: VecDeque<(String, JoinReply)>,
}

/// State shared between the facade and the worker thread
///
/// Lock order: `state` before `outbox`.
#[derive(Debug)]
pub(crate) struct Shared {
    pub state: Mutex<ConnectionState>,
    pub outbox: Mutex<Outbox>,
    pub events: EventQueue,
    pub stop: AtomicBool,
    worker: Mutex<Option<Thread>>,
}

impl Shared {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            state: Mutex::new(ConnectionState::Uninitialized),
            outbox: Mutex::new(Outbox::default()),
            events: EventQueue::new(queue_capacity),
            stop: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to `next` unless the client has been shut down
    fn transition(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state != ConnectionState::ShutDown && *state != next {
            log::debug!("State {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    pub fn set_worker(&self, thread: Option<Thread>) {
        *self.worker.lock() = thread;
    }

    /// Cut the worker's current sleep short
    pub fn wake(&self) {
        if let Some(thread) = self.worker.lock().as_ref() {
            thread.unpark();
        }
    }
}

/// Which dispatch events to subscribe to after READY
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Subscriptions {
    pub join_game: bool,
    pub spectate_game: bool,
    pub join_request: bool,
}

impl Subscriptions {
    fn events(self) -> impl Iterator<Item = EventName> {
        [
            (self.join_game, EventName::ActivityJoin),
            (self.spectate_game, EventName::ActivitySpectate),
            (self.join_request, EventName::ActivityJoinRequest),
        ]
        .into_iter()
        .filter_map(|(wanted, event)| wanted.then_some(event))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No pipe open
    Closed,
    /// Handshake sent, waiting for READY
    Handshaking { since: Instant },
    Ready,
}

pub(crate) struct Session<T: Transport> {
    transport: T,
    shared: Arc<Shared>,
    client_id: String,
    config: RpcConfig,
    subscriptions: Subscriptions,
    backoff: Backoff,
    phase: Phase,
    last_sent: Option<Instant>,
    /// Re-sent after every reconnect
    published: Option<PresenceUpdate>,
    gave_up: bool,
    pid: u32,
}

impl<T: Transport> Session<T> {
    pub fn new(
        transport: T,
        shared: Arc<Shared>,
        client_id: String,
        config: RpcConfig,
        subscriptions: Subscriptions,
    ) -> Self {
        let backoff = Backoff::new(config.retry.clone());
        Self {
            transport,
            shared,
            client_id,
            config,
            subscriptions,
            backoff,
            phase: Phase::Closed,
            last_sent: None,
            published: None,
            gave_up: false,
            pid: std::process::id(),
        }
    }

    /// Worker loop: tick until asked to stop, then close the transport
    pub fn run(mut self) {
        self.shared.set_worker(Some(std::thread::current()));
        while !self.shared.stop.load(Ordering::Acquire) {
            self.tick(Instant::now());
            std::thread::park_timeout(self.config.poll_interval);
        }
        self.close();
        self.shared.set_worker(None);
        log::debug!("Worker for {} stopped", self.client_id);
    }

    pub fn tick(&mut self, now: Instant) {
        match self.phase {
            Phase::Closed => self.maybe_connect(now),
            Phase::Handshaking { since } => {
                self.pump(now);
                if let Phase::Handshaking { .. } = self.phase {
                    if now.saturating_duration_since(since) >= self.config.handshake_timeout {
                        log::debug!("No READY within {:?}", self.config.handshake_timeout);
                        self.transport.close();
                        self.phase = Phase::Closed;
                        self.backoff.record_failure(now);
                        self.check_exhausted(codes::HANDSHAKE_TIMEOUT);
                    }
                }
            }
            Phase::Ready => self.pump(now),
        }

        if self.phase == Phase::Ready {
            self.flush(now);
        }
    }

    fn close(&mut self) {
        if self.phase != Phase::Closed {
            self.transport.close();
            self.phase = Phase::Closed;
        }
    }

    fn maybe_connect(&mut self, now: Instant) {
        if self.shared.state() == ConnectionState::Disconnected && !self.config.auto_reconnect {
            return;
        }
        if !self.backoff.is_due(now) {
            return;
        }

        self.shared.transition(ConnectionState::Connecting);

        let opened = self.transport.connect().and_then(|()| {
            let handshake = encoder::handshake_frame(self.config.ipc_version, &self.client_id)?;
            self.transport.send(&handshake)
        });

        match opened {
            Ok(()) => {
                log::debug!("Pipe open, handshake sent for {}", self.client_id);
                self.phase = Phase::Handshaking { since: now };
            }
            Err(err) => {
                self.transport.close();
                let delay = self.backoff.record_failure(now);
                log::trace!("Connect failed ({}), retrying in {:?}", err, delay);
                self.check_exhausted(err.code());
            }
        }
    }

    /// Report giving up once, with the code of the last failed attempt
    fn check_exhausted(&mut self, code: i32) {
        if self.backoff.is_exhausted() && !self.gave_up {
            self.gave_up = true;
            self.shared.events.push(Event::Errored {
                code,
                message: format!(
                    "Gave up connecting after {} attempts",
                    self.backoff.failures()
                ),
            });
        }
    }

    /// Read and handle every frame currently available
    fn pump(&mut self, now: Instant) {
        loop {
            match self.transport.receive() {
                Ok(Some(frame)) => {
                    self.handle_frame(frame, now);
                    if self.phase == Phase::Closed {
                        return;
                    }
                }
                Ok(None) => return,
                Err(err) => {
                    self.lost(err.code(), err.to_string(), now);
                    return;
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame, now: Instant) {
        match frame.opcode {
            Opcode::Ping => {
                let pong = Frame::new(Opcode::Pong, frame.payload);
                if let Err(err) = self.transport.send(&pong) {
                    self.lost(err.code(), err.to_string(), now);
                }
            }
            Opcode::Close => {
                let (code, message) = close_detail(&frame.payload);
                self.lost(code, message, now);
            }
            Opcode::Frame => match serde_json::from_value::<IpcResponse>(frame.payload) {
                Ok(response) => self.handle_response(response, now),
                Err(err) => {
                    let err = RpcError::from(err);
                    self.lost(err.code(), err.to_string(), now);
                }
            },
            Opcode::Handshake | Opcode::Pong => {}
        }
    }

    fn handle_response(&mut self, response: IpcResponse, now: Instant) {
        match response.event() {
            Some(EventName::Ready) => self.on_ready(&response, now),
            Some(EventName::Error) => {
                let (code, message) = response.error_detail();
                self.shared.events.push(Event::Errored { code, message });
            }
            Some(EventName::ActivityJoin) => {
                if let Some(secret) = secret_of(&response) {
                    self.shared.events.push(Event::JoinGame(secret));
                }
            }
            Some(EventName::ActivitySpectate) => {
                if let Some(secret) = secret_of(&response) {
                    self.shared.events.push(Event::SpectateGame(secret));
                }
            }
            Some(EventName::ActivityJoinRequest) => {
                if let Some(user) = User::from_dispatch(&response.data) {
                    self.shared.events.push(Event::JoinRequest(user));
                }
            }
            None => log::trace!("Ignoring response {:?}/{:?}", response.cmd, response.evt),
        }
    }

    fn on_ready(&mut self, response: &IpcResponse, now: Instant) {
        if self.phase == Phase::Ready {
            return;
        }

        self.phase = Phase::Ready;
        self.backoff.reset();
        self.gave_up = false;
        self.shared.transition(ConnectionState::Ready);

        let user = User::from_dispatch(&response.data).unwrap_or_default();
        self.shared.events.push(Event::Ready(user));

        for event in self.subscriptions.events() {
            let sent = encoder::subscribe_frame(event, generate_nonce("subscribe"))
                .and_then(|frame| self.transport.send(&frame));
            if let Err(err) = sent {
                self.lost(err.code(), err.to_string(), now);
                return;
            }
        }

        // The peer forgets presence when the pipe drops
        let mut outbox = self.shared.outbox.lock();
        if outbox.presence.is_none() {
            outbox.presence = self.published.clone();
        }
        drop(outbox);
        self.last_sent = None;
    }

    fn lost(&mut self, code: i32, message: String, now: Instant) {
        let was_ready = self.phase == Phase::Ready;
        self.transport.close();
        self.phase = Phase::Closed;

        if was_ready {
            log::debug!("Peer went away: {} {}", code, message);
            self.shared.transition(ConnectionState::Disconnected);
            self.shared
                .events
                .push(Event::Disconnected { code, message });
            self.backoff.schedule_after_drop(now);
        } else {
            // Refused during handshake, e.g. an unknown application id
            if code != codes::PIPE_CLOSED {
                self.shared
                    .events
                    .push(Event::Disconnected { code, message });
            }
            self.backoff.record_failure(now);
            self.check_exhausted(code);
        }
    }

    fn debounce_elapsed(&self, now: Instant) -> bool {
        self.last_sent.map_or(true, |at| {
            now.saturating_duration_since(at) >= self.config.debounce
        })
    }

    fn flush(&mut self, now: Instant) {
        let replies: Vec<_> = self.shared.outbox.lock().replies.drain(..).collect();
        let mut replies = replies.into_iter();

        while let Some((user_id, reply)) = replies.next() {
            let sent = encoder::join_reply_frame(&user_id, reply, generate_nonce("join-reply"))
                .and_then(|frame| match frame {
                    Some(frame) => self.transport.send(&frame),
                    None => Ok(()),
                });
            if let Err(err) = sent {
                // Unsent replies go back ahead of anything queued meanwhile
                let mut outbox = self.shared.outbox.lock();
                for pending in std::iter::once((user_id, reply)).chain(replies).rev() {
                    outbox.replies.push_front(pending);
                }
                drop(outbox);
                self.lost(err.code(), err.to_string(), now);
                return;
            }
        }

        let update = if self.debounce_elapsed(now) {
            self.shared.outbox.lock().presence.take()
        } else {
            None
        };

        if let Some(update) = update {
            let sent = encoder::set_activity_frame(
                update.activity(),
                self.pid,
                generate_nonce("set-activity"),
            )
            .and_then(|frame| self.transport.send(&frame));

            match sent {
                Ok(()) => {
                    self.last_sent = Some(now);
                    self.published = Some(update);
                }
                Err(err) => {
                    // Keep it for the next connection
                    let mut outbox = self.shared.outbox.lock();
                    if outbox.presence.is_none() {
                        outbox.presence = Some(update);
                    }
                    drop(outbox);
                    self.lost(err.code(), err.to_string(), now);
                }
            }
        }
    }
}

fn secret_of(response: &IpcResponse) -> Option<String> {
    response
        .data
        .get("secret")
        .and_then(|s| s.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use serde_json::json;
    use std::time::Duration;

    /// In-process peer; `connect` succeeds only while `listening`
    #[derive(Default)]
    struct ScriptedPeer {
        listening: bool,
        open: bool,
        inbox: VecDeque<Frame>,
        sent: Vec<Frame>,
        connects: u32,
        /// Fail every write after the handshake
        fail_commands: bool,
    }

    #[derive(Clone, Default)]
    struct Mock(Arc<Mutex<ScriptedPeer>>);

    impl Mock {
        fn push(&self, frame: Frame) {
            self.0.lock().inbox.push_back(frame);
        }

        fn ready(&self) {
            self.push(Frame::new(
                Opcode::Frame,
                json!({"cmd": "DISPATCH", "evt": "READY", "data": {"v": 1, "user": {"id": "1", "username": "tester"}}}),
            ));
        }

        fn sent_commands(&self) -> Vec<String> {
            self.0
                .lock()
                .sent
                .iter()
                .filter_map(|f| f.payload.get("cmd").and_then(|c| c.as_str()).map(String::from))
                .collect()
        }
    }

    impl Transport for Mock {
        fn connect(&mut self) -> Result {
            let mut peer = self.0.lock();
            peer.connects += 1;
            if peer.listening {
                peer.open = true;
                Ok(())
            } else {
                Err(RpcError::transport(codes::PIPE_CLOSED, "not listening"))
            }
        }

        fn send(&mut self, frame: &Frame) -> Result {
            let mut peer = self.0.lock();
            if !peer.open {
                return Err(RpcError::transport(codes::PIPE_CLOSED, "closed"));
            }
            if peer.fail_commands && frame.opcode == Opcode::Frame {
                return Err(RpcError::transport(codes::PIPE_CLOSED, "write failed"));
            }
            peer.sent.push(frame.clone());
            Ok(())
        }

        fn receive(&mut self) -> Result<Option<Frame>> {
            let mut peer = self.0.lock();
            if !peer.open {
                return Err(RpcError::transport(codes::PIPE_CLOSED, "closed"));
            }
            Ok(peer.inbox.pop_front())
        }

        fn close(&mut self) {
            self.0.lock().open = false;
        }
    }

    fn session(mock: &Mock, config: RpcConfig) -> (Session<Mock>, Arc<Shared>) {
        let shared = Arc::new(Shared::new(config.queue_capacity));
        *shared.state.lock() = ConnectionState::Connecting;
        let session = Session::new(
            mock.clone(),
            shared.clone(),
            "app1".into(),
            config,
            Subscriptions::default(),
        );
        (session, shared)
    }

    fn quick_config() -> RpcConfig {
        RpcConfig::default()
            .with_retry(crate::retry::RetryConfig::new(None, 100, 1_000, 2.0))
            .with_debounce(Duration::from_millis(50))
    }

    fn activity(state: &str) -> PresenceUpdate {
        PresenceUpdate::Set(Activity {
            state: Some(state.into()),
            ..Activity::default()
        })
    }

    #[test]
    fn handshake_then_ready() {
        let mock = Mock::default();
        mock.0.lock().listening = true;
        let (mut session, shared) = session(&mock, quick_config());
        let t0 = Instant::now();

        session.tick(t0);
        {
            let peer = mock.0.lock();
            assert_eq!(peer.sent.len(), 1);
            assert_eq!(peer.sent[0].opcode, Opcode::Handshake);
            assert_eq!(peer.sent[0].payload, json!({"v": 1, "client_id": "app1"}));
        }
        assert_eq!(shared.state(), ConnectionState::Connecting);

        mock.ready();
        session.tick(t0);
        assert_eq!(shared.state(), ConnectionState::Ready);
        match shared.events.drain().as_slice() {
            [Event::Ready(user)] => assert_eq!(user.username, "tester"),
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn connect_failures_back_off_without_events() {
        let mock = Mock::default();
        let (mut session, shared) = session(&mock, quick_config());
        let t0 = Instant::now();

        session.tick(t0);
        session.tick(t0 + Duration::from_millis(50));
        assert_eq!(mock.0.lock().connects, 1);

        session.tick(t0 + Duration::from_millis(100));
        assert_eq!(mock.0.lock().connects, 2);
        // second delay is 200ms from the second failure
        session.tick(t0 + Duration::from_millis(250));
        assert_eq!(mock.0.lock().connects, 2);
        session.tick(t0 + Duration::from_millis(300));
        assert_eq!(mock.0.lock().connects, 3);

        assert!(shared.events.is_empty());
        assert_eq!(shared.state(), ConnectionState::Connecting);
    }

    #[test]
    fn bounded_retries_report_giving_up_once() {
        let mock = Mock::default();
        let config = quick_config().with_retry(crate::retry::RetryConfig::new(Some(2), 1, 1, 1.0));
        let (mut session, shared) = session(&mock, config);
        let t0 = Instant::now();

        for i in 0..10 {
            session.tick(t0 + Duration::from_millis(i * 10));
        }
        assert_eq!(mock.0.lock().connects, 2);
        let events = shared.events.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::Errored { code: codes::PIPE_CLOSED, .. }));
    }

    #[test]
    fn handshake_timeout_closes_and_retries() {
        let mock = Mock::default();
        mock.0.lock().listening = true;
        let config = quick_config().with_handshake_timeout(Duration::from_millis(500));
        let (mut session, shared) = session(&mock, config);
        let t0 = Instant::now();

        session.tick(t0);
        session.tick(t0 + Duration::from_millis(500));
        assert!(!mock.0.lock().open);
        assert!(shared.events.is_empty());

        session.tick(t0 + Duration::from_millis(600));
        assert_eq!(mock.0.lock().connects, 2);
    }

    #[test]
    fn close_during_handshake_reports_peer_reason() {
        let mock = Mock::default();
        mock.0.lock().listening = true;
        let (mut session, shared) = session(&mock, quick_config());
        let t0 = Instant::now();

        session.tick(t0);
        mock.push(Frame::new(
            Opcode::Close,
            json!({"code": 4000, "message": "Invalid Client ID"}),
        ));
        session.tick(t0);

        assert_eq!(
            shared.events.drain(),
            vec![Event::Disconnected {
                code: 4000,
                message: "Invalid Client ID".into()
            }]
        );
        assert_eq!(shared.state(), ConnectionState::Connecting);
    }

    #[test]
    fn pending_presence_is_debounced_and_latest_wins() {
        let mock = Mock::default();
        mock.0.lock().listening = true;
        let (mut session, shared) = session(&mock, quick_config());
        let t0 = Instant::now();
        session.tick(t0);
        mock.ready();

        shared.outbox.lock().presence = Some(activity("first"));
        session.tick(t0);
        assert_eq!(mock.sent_commands(), vec!["SET_ACTIVITY"]);

        shared.outbox.lock().presence = Some(activity("second"));
        session.tick(t0 + Duration::from_millis(10));
        shared.outbox.lock().presence = Some(activity("third"));
        session.tick(t0 + Duration::from_millis(20));
        assert_eq!(mock.sent_commands().len(), 1);

        session.tick(t0 + Duration::from_millis(50));
        let peer = mock.0.lock();
        assert_eq!(peer.sent.len(), 3);
        assert_eq!(peer.sent[2].payload["args"]["activity"]["state"], "third");
    }

    #[test]
    fn ping_is_answered_with_same_payload() {
        let mock = Mock::default();
        mock.0.lock().listening = true;
        let (mut session, _shared) = session(&mock, quick_config());
        let t0 = Instant::now();
        session.tick(t0);
        mock.ready();
        mock.push(Frame::new(Opcode::Ping, json!({"n": 7})));
        session.tick(t0);

        let peer = mock.0.lock();
        let pong = peer.sent.last().unwrap();
        assert_eq!(pong.opcode, Opcode::Pong);
        assert_eq!(pong.payload, json!({"n": 7}));
    }

    #[test]
    fn disconnect_then_reconnect_resends_presence() {
        let mock = Mock::default();
        mock.0.lock().listening = true;
        let (mut session, shared) = session(&mock, quick_config());
        let t0 = Instant::now();
        session.tick(t0);
        mock.ready();
        shared.outbox.lock().presence = Some(activity("kept"));
        session.tick(t0);
        shared.events.clear();

        mock.push(Frame::new(Opcode::Close, json!({"code": 1000, "message": "bye"})));
        session.tick(t0 + Duration::from_millis(1));
        assert_eq!(shared.state(), ConnectionState::Disconnected);
        assert_eq!(
            shared.events.drain(),
            vec![Event::Disconnected {
                code: 1000,
                message: "bye".into()
            }]
        );

        session.tick(t0 + Duration::from_millis(101));
        assert_eq!(shared.state(), ConnectionState::Connecting);
        mock.ready();
        session.tick(t0 + Duration::from_millis(102));
        assert_eq!(shared.state(), ConnectionState::Ready);

        let peer = mock.0.lock();
        let last = peer.sent.last().unwrap();
        assert_eq!(last.payload["cmd"], "SET_ACTIVITY");
        assert_eq!(last.payload["args"]["activity"]["state"], "kept");
    }

    #[test]
    fn no_reconnect_when_disabled() {
        let mock = Mock::default();
        mock.0.lock().listening = true;
        let (mut session, shared) = session(&mock, quick_config().with_auto_reconnect(false));
        let t0 = Instant::now();
        session.tick(t0);
        mock.ready();
        session.tick(t0);
        mock.push(Frame::new(Opcode::Close, json!({})));
        session.tick(t0);

        session.tick(t0 + Duration::from_secs(10));
        assert_eq!(mock.0.lock().connects, 1);
        assert_eq!(shared.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn subscriptions_and_invite_events() {
        let mock = Mock::default();
        mock.0.lock().listening = true;
        let shared = Arc::new(Shared::new(16));
        let mut session = Session::new(
            mock.clone(),
            shared.clone(),
            "app1".into(),
            quick_config(),
            Subscriptions {
                join_game: true,
                spectate_game: false,
                join_request: true,
            },
        );
        let t0 = Instant::now();
        session.tick(t0);
        mock.ready();
        session.tick(t0);

        let subscribed: Vec<String> = mock
            .0
            .lock()
            .sent
            .iter()
            .filter_map(|f| f.payload.get("evt").and_then(|e| e.as_str()).map(String::from))
            .collect();
        assert_eq!(subscribed, vec!["ACTIVITY_JOIN", "ACTIVITY_JOIN_REQUEST"]);

        mock.push(Frame::new(
            Opcode::Frame,
            json!({"cmd": "DISPATCH", "evt": "ACTIVITY_JOIN", "data": {"secret": "s3cr3t"}}),
        ));
        mock.push(Frame::new(
            Opcode::Frame,
            json!({"cmd": "DISPATCH", "evt": "ACTIVITY_JOIN_REQUEST", "data": {"user": {"id": "9", "username": "friend"}}}),
        ));
        mock.push(Frame::new(
            Opcode::Frame,
            json!({"cmd": "SET_ACTIVITY", "evt": "ERROR", "data": {"code": 4002, "message": "bad pid"}}),
        ));
        session.tick(t0);

        let events = shared.events.drain();
        assert_eq!(events[0], Event::Ready(User { id: "1".into(), username: "tester".into(), ..User::default() }));
        assert_eq!(events[1], Event::JoinGame("s3cr3t".into()));
        assert!(matches!(&events[2], Event::JoinRequest(u) if u.username == "friend"));
        assert_eq!(
            events[3],
            Event::Errored {
                code: 4002,
                message: "bad pid".into()
            }
        );
    }

    #[test]
    fn join_replies_are_flushed_when_ready() {
        let mock = Mock::default();
        mock.0.lock().listening = true;
        let (mut session, shared) = session(&mock, quick_config());
        shared
            .outbox
            .lock()
            .replies
            .push_back(("9".into(), JoinReply::Yes));
        let t0 = Instant::now();
        session.tick(t0);
        assert_eq!(mock.0.lock().sent.len(), 1);

        mock.ready();
        session.tick(t0);
        assert_eq!(mock.sent_commands(), vec!["SEND_ACTIVITY_JOIN_INVITE"]);
    }

    #[test]
    fn failed_reply_write_keeps_pending_presence_and_replies() {
        let mock = Mock::default();
        mock.0.lock().listening = true;
        let (mut session, shared) = session(&mock, quick_config());
        let t0 = Instant::now();
        session.tick(t0);
        mock.ready();
        shared.outbox.lock().presence = Some(activity("old"));
        session.tick(t0);

        {
            let mut outbox = shared.outbox.lock();
            outbox.presence = Some(activity("new"));
            outbox.replies.push_back(("9".into(), JoinReply::Yes));
            outbox.replies.push_back(("10".into(), JoinReply::No));
        }
        mock.0.lock().fail_commands = true;
        session.tick(t0 + Duration::from_millis(60));

        assert_eq!(shared.state(), ConnectionState::Disconnected);
        {
            let outbox = shared.outbox.lock();
            assert_eq!(outbox.presence, Some(activity("new")));
            let users: Vec<&str> = outbox.replies.iter().map(|(id, _)| id.as_str()).collect();
            assert_eq!(users, vec!["9", "10"]);
        }

        mock.0.lock().fail_commands = false;
        session.tick(t0 + Duration::from_millis(200));
        mock.ready();
        session.tick(t0 + Duration::from_millis(201));

        let peer = mock.0.lock();
        let presence = peer
            .sent
            .iter()
            .filter(|f| f.payload["cmd"] == "SET_ACTIVITY")
            .last()
            .unwrap();
        assert_eq!(presence.payload["args"]["activity"]["state"], "new");
        let invites: Vec<&Frame> = peer
            .sent
            .iter()
            .filter(|f| f.opcode == Opcode::Frame && f.payload["cmd"] != "SET_ACTIVITY")
            .collect();
        assert_eq!(invites.len(), 2);
        assert_eq!(invites[0].payload["args"]["user_id"], "9");
    }

    #[test]
    fn bounded_handshake_timeouts_report_timeout_code() {
        let mock = Mock::default();
        mock.0.lock().listening = true;
        let config = quick_config()
            .with_retry(crate::retry::RetryConfig::new(Some(1), 1, 1, 1.0))
            .with_handshake_timeout(Duration::from_millis(100));
        let (mut session, shared) = session(&mock, config);
        let t0 = Instant::now();

        session.tick(t0);
        session.tick(t0 + Duration::from_millis(100));
        session.tick(t0 + Duration::from_millis(300));

        assert_eq!(mock.0.lock().connects, 1);
        let events = shared.events.drain();
        assert!(matches!(
            events.as_slice(),
            [Event::Errored { code: codes::HANDSHAKE_TIMEOUT, .. }]
        ));
    }

    #[test]
    fn shutdown_state_is_never_overwritten() {
        let mock = Mock::default();
        mock.0.lock().listening = true;
        let (mut session, shared) = session(&mock, quick_config());
        *shared.state.lock() = ConnectionState::ShutDown;
        let t0 = Instant::now();
        session.tick(t0);
        mock.ready();
        session.tick(t0);
        assert_eq!(shared.state(), ConnectionState::ShutDown);
    }
}
