//! Frame encoding and incremental decoding

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use bytes::{Buf, BytesMut};
use serde_json::Value;

use crate::error::{Result, RpcError};
use crate::ipc::protocol::{constants, Opcode};

/// One discrete message on the pipe
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: Value,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: Value) -> Self {
        Self { opcode, payload }
    }

    /// Serialize into header + JSON body
    pub fn encode(&self) -> Result<Vec<u8>> {
        let raw = serde_json::to_vec(&self.payload)?;
        let length = u32::try_from(raw.len())
            .map_err(|_| RpcError::Protocol(format!("payload of {} bytes", raw.len())))?;

        let mut buffer = Vec::with_capacity(constants::IPC_HEADER_SIZE + raw.len());
        buffer.write_u32::<LittleEndian>(self.opcode.into())?;
        buffer.write_u32::<LittleEndian>(length)?;
        buffer.extend_from_slice(&raw);
        Ok(buffer)
    }
}

/// Accumulates bytes read from a non-blocking pipe and yields whole frames
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_payload_size: u32,
}

impl FrameDecoder {
    const INITIAL_BUFFER_CAPACITY: usize = 4096;

    pub fn new(max_payload_size: u32) -> Self {
        Self {
            buf: BytesMut::with_capacity(Self::INITIAL_BUFFER_CAPACITY),
            max_payload_size,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, or `None` if more bytes are needed
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.buf.len() < constants::IPC_HEADER_SIZE {
            return Ok(None);
        }

        let opcode_raw = LittleEndian::read_u32(&self.buf[0..4]);
        let length = LittleEndian::read_u32(&self.buf[4..8]);

        if length > self.max_payload_size {
            return Err(RpcError::Protocol(format!(
                "payload of {} bytes exceeds limit of {}",
                length, self.max_payload_size
            )));
        }
        let opcode = Opcode::try_from(opcode_raw)?;

        let total = constants::IPC_HEADER_SIZE + length as usize;
        if self.buf.len() < total {
            return Ok(None);
        }

        self.buf.advance(constants::IPC_HEADER_SIZE);
        let body = self.buf.split_to(length as usize);
        let payload: Value = serde_json::from_slice(&body)?;
        Ok(Some(Frame { opcode, payload }))
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
