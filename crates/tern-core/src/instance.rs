//! Protocol engine boundary
//!
//! The runtime never interprets protocol traffic. It hands frames, datagrams
//! and alarm expiries to an [`Instance`] and pulls outbound traffic back out.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::alarm::{AlarmDomain, AlarmService};

/// UDP datagram crossing the engine boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    /// Host-side socket address
    pub local: SocketAddr,
    /// Remote address
    pub peer: SocketAddr,
    /// Datagram contents
    pub payload: Bytes,
}

impl UdpDatagram {
    /// Create a new datagram
    pub fn new(local: SocketAddr, peer: SocketAddr, payload: impl Into<Bytes>) -> Self {
        Self {
            local,
            peer,
            payload: payload.into(),
        }
    }
}

/// The protocol engine as seen from the host runtime
///
/// Only [`alarm_fired`](Instance::alarm_fired) is required. An engine that
/// uses no radio or no UDP keeps the default no-op entry points.
pub trait Instance {
    /// An armed alarm in `domain` reached its deadline.
    ///
    /// The domain is already disarmed. The engine may re-arm it through
    /// `alarms`.
    fn alarm_fired(&mut self, domain: AlarmDomain, alarms: &mut AlarmService);

    /// A frame arrived from the radio link
    fn radio_received(&mut self, _frame: &[u8]) {}

    /// Next frame to hand to the radio link, if any
    fn next_radio_transmit(&mut self) -> Option<Bytes> {
        None
    }

    /// A datagram arrived on a host UDP socket
    fn udp_received(&mut self, _datagram: UdpDatagram) {}

    /// Next datagram to send from a host UDP socket, if any
    fn next_udp_transmit(&mut self) -> Option<UdpDatagram> {
        None
    }
}
