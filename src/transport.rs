//! The transport capability the connection manager drives
//!
//! [`IpcTransport`](crate::ipc::IpcTransport) is the platform implementation;
//! tests plug in a scripted peer.

use crate::error::Result;
use crate::ipc::Frame;

/// A bidirectional, frame-oriented channel to the peer process
///
/// Implementations are owned by exactly one worker thread and are never
/// shared between clients.
pub trait Transport: Send + 'static {
    /// Open the channel. Fails if the peer is not listening.
    fn connect(&mut self) -> Result;

    /// Write one frame
    fn send(&mut self, frame: &Frame) -> Result;

    /// Return the next complete frame if one is available, without blocking
    fn receive(&mut self) -> Result<Option<Frame>>;

    /// Close the channel. Calling it on a closed transport is a no-op.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self) -> Result {
        (**self).connect()
    }

    fn send(&mut self, frame: &Frame) -> Result {
        (**self).send(frame)
    }

    fn receive(&mut self) -> Result<Option<Frame>> {
        (**self).receive()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
