//! Scripted in-memory peer for driving `RpcClient` end to end
#![allow(dead_code)]

use parking_lot::Mutex;
use richlink::{Frame, Opcode, RetryConfig, RpcConfig, Transport};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct PeerState {
    pub listening: bool,
    /// Answer every handshake with READY
    pub auto_ready: bool,
    pub open: bool,
    pub inbox: VecDeque<Frame>,
    pub received: Vec<Frame>,
    pub connects: usize,
}

impl Default for PeerState {
    fn default() -> Self {
        Self {
            listening: false,
            auto_ready: true,
            open: false,
            inbox: VecDeque::new(),
            received: Vec::new(),
            connects: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockPeer(pub Arc<Mutex<PeerState>>);

impl MockPeer {
    pub fn listening() -> Self {
        let peer = Self::default();
        peer.0.lock().listening = true;
        peer
    }

    pub fn factory(&self) -> impl FnMut(&RpcConfig) -> Box<dyn Transport> + Send + 'static {
        let peer = self.clone();
        move |_: &RpcConfig| Box::new(PeerTransport(peer.clone())) as Box<dyn Transport>
    }

    pub fn set_listening(&self, listening: bool) {
        self.0.lock().listening = listening;
    }

    pub fn is_open(&self) -> bool {
        self.0.lock().open
    }

    pub fn connects(&self) -> usize {
        self.0.lock().connects
    }

    pub fn inbox_is_empty(&self) -> bool {
        self.0.lock().inbox.is_empty()
    }

    /// Queue a DISPATCH frame for the client
    pub fn dispatch(&self, evt: &str, data: Value) {
        self.0.lock().inbox.push_back(Frame::new(
            Opcode::Frame,
            json!({"cmd": "DISPATCH", "evt": evt, "data": data, "nonce": null}),
        ));
    }

    /// Queue an ERROR response for the client
    pub fn error(&self, code: i32, message: &str) {
        self.0.lock().inbox.push_back(Frame::new(
            Opcode::Frame,
            json!({"cmd": "SET_ACTIVITY", "evt": "ERROR", "data": {"code": code, "message": message}}),
        ));
    }

    pub fn close_with(&self, code: i32, message: &str) {
        self.0.lock().inbox.push_back(Frame::new(
            Opcode::Close,
            json!({"code": code, "message": message}),
        ));
    }

    pub fn commands(&self, cmd: &str) -> Vec<Frame> {
        self.0
            .lock()
            .received
            .iter()
            .filter(|f| f.payload.get("cmd").and_then(Value::as_str) == Some(cmd))
            .cloned()
            .collect()
    }

    pub fn presence_frames(&self) -> Vec<Frame> {
        self.commands("SET_ACTIVITY")
    }

    /// The activity the peer would currently display
    pub fn visible_activity(&self) -> Option<Value> {
        self.presence_frames()
            .last()
            .map(|f| f.payload["args"]["activity"].clone())
    }
}

pub struct PeerTransport(MockPeer);

impl Transport for PeerTransport {
    fn connect(&mut self) -> richlink::Result {
        let mut peer = self.0 .0.lock();
        peer.connects += 1;
        if !peer.listening {
            return Err(richlink::RpcError::transport(1, "nobody listening"));
        }
        peer.open = true;
        Ok(())
    }

    fn send(&mut self, frame: &Frame) -> richlink::Result {
        let mut peer = self.0 .0.lock();
        if !peer.open {
            return Err(richlink::RpcError::transport(1, "closed"));
        }
        if frame.opcode == Opcode::Handshake && peer.auto_ready {
            peer.inbox.push_back(Frame::new(
                Opcode::Frame,
                json!({
                    "cmd": "DISPATCH",
                    "evt": "READY",
                    "data": {"v": 1, "user": {"id": "42", "username": "tester", "discriminator": "0"}}
                }),
            ));
        }
        peer.received.push(frame.clone());
        Ok(())
    }

    fn receive(&mut self) -> richlink::Result<Option<Frame>> {
        let mut peer = self.0 .0.lock();
        if !peer.open {
            return Err(richlink::RpcError::transport(1, "closed"));
        }
        Ok(peer.inbox.pop_front())
    }

    fn close(&mut self) {
        self.0 .0.lock().open = false;
    }
}

/// Millisecond-scale timings so tests finish quickly
pub fn fast_config() -> RpcConfig {
    RpcConfig::default()
        .with_poll_interval(Duration::from_millis(2))
        .with_debounce(Duration::ZERO)
        .with_retry(RetryConfig::new(None, 10, 50, 2.0))
}

pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
