//! # Virtual Time Event Wire Format
//!
//! One simulation event per UDP datagram, packed little-endian:
//!
//! ```text
//! [delay:8][kind:1][length:2][payload:length]
//! ```
//!
//! - **delay**: Microseconds of virtual time that pass before the event
//! - **kind**: [`EventKind`]
//! - **length**: Payload length, at most [`MAX_EVENT_DATA_SIZE`]
//! - **payload**: Event data
//!
//! Encoding writes exactly `11 + length` bytes. Decoding ignores anything
//! after the payload, since peers may send the full fixed-size record.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_more::Display;

use crate::error::{SimError, SimResult};

/// Largest event payload
pub const MAX_EVENT_DATA_SIZE: usize = 1024;

/// Size of the fixed header
pub const EVENT_HEADER_LEN: usize = 11;

/// Size of the largest encoded event
pub const MAX_EVENT_SIZE: usize = EVENT_HEADER_LEN + MAX_EVENT_DATA_SIZE;

/// Simulation event types
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    /// Time passes. Sent by a node to announce how long it will sleep.
    AlarmFired = 0,
    /// An over-the-air frame reaches this node's radio
    RadioReceived = 1,
    /// Console output
    UartWrite = 2,
    /// A spinel frame between host and simulated RCP
    RadioSpinelWrite = 3,
}

impl TryFrom<u8> for EventKind {
    type Error = SimError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AlarmFired),
            1 => Ok(Self::RadioReceived),
            2 => Ok(Self::UartWrite),
            3 => Ok(Self::RadioSpinelWrite),
            _ => Err(SimError::UnknownEventKind(value)),
        }
    }
}

/// A timed simulation event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualTimeEvent {
    delay: u64,
    kind: EventKind,
    payload: Bytes,
}

impl VirtualTimeEvent {
    /// Create an event, rejecting payloads over [`MAX_EVENT_DATA_SIZE`]
    pub fn new(delay: u64, kind: EventKind, payload: impl Into<Bytes>) -> SimResult<Self> {
        let payload = payload.into();
        if payload.len() > MAX_EVENT_DATA_SIZE {
            return Err(SimError::PayloadTooLarge {
                size: payload.len(),
                limit: MAX_EVENT_DATA_SIZE,
            });
        }
        Ok(Self {
            delay,
            kind,
            payload,
        })
    }

    /// Sleep announcement for `timeout`. `None` sleeps until woken.
    pub fn sleep(timeout: Option<Duration>) -> Self {
        let delay = match timeout {
            Some(timeout) => u64::try_from(timeout.as_micros()).unwrap_or(u64::MAX),
            None => u64::MAX,
        };
        Self {
            delay,
            kind: EventKind::AlarmFired,
            payload: Bytes::new(),
        }
    }

    /// Spinel frame written by the host, taking no time
    pub fn spinel_write(frame: impl Into<Bytes>) -> SimResult<Self> {
        Self::new(0, EventKind::RadioSpinelWrite, frame)
    }

    pub fn delay(&self) -> u64 {
        self.delay
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Encoded length
    pub fn encoded_len(&self) -> usize {
        EVENT_HEADER_LEN + self.payload.len()
    }

    /// Append the wire form to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u64_le(self.delay);
        buf.put_u8(self.kind as u8);
        // Bounded by MAX_EVENT_DATA_SIZE at construction.
        buf.put_u16_le(self.payload.len() as u16);
        buf.put_slice(&self.payload);
    }

    /// Wire form
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Parse one event from a received datagram
    pub fn decode(datagram: &[u8]) -> SimResult<Self> {
        if datagram.len() < EVENT_HEADER_LEN {
            return Err(SimError::Truncated {
                len: datagram.len(),
                need: EVENT_HEADER_LEN,
            });
        }

        let mut buf = datagram;
        let delay = buf.get_u64_le();
        let kind = EventKind::try_from(buf.get_u8())?;
        let length = buf.get_u16_le() as usize;

        if length > MAX_EVENT_DATA_SIZE {
            return Err(SimError::PayloadTooLarge {
                size: length,
                limit: MAX_EVENT_DATA_SIZE,
            });
        }
        if buf.remaining() < length {
            return Err(SimError::Truncated {
                len: datagram.len(),
                need: EVENT_HEADER_LEN + length,
            });
        }

        Ok(Self {
            delay,
            kind,
            payload: Bytes::copy_from_slice(&buf[..length]),
        })
    }
}
