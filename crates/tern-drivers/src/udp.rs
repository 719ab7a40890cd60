//! Host UDP driver
//!
//! Binds the configured UDP sockets non-blocking, hands received datagrams
//! to the protocol engine and sends what the engine queues.

use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::os::fd::AsRawFd;

use bytes::Bytes;
use tern_core::{
    AlarmService, Driver, DriverError, DriverKind, Host, MainloopContext, PlatformConfig,
    UdpDatagram,
};
use tracing::{debug, trace, warn};

/// Receive buffer size, the largest UDP payload
const MAX_DATAGRAM_SIZE: usize = 65_535;

#[derive(Debug)]
struct BoundSocket {
    socket: UdpSocket,
    local: SocketAddr,
}

/// Datagram counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UdpStats {
    pub rx_datagrams: u64,
    pub tx_datagrams: u64,
    pub tx_dropped: u64,
}

/// Driver owning the host UDP sockets
#[derive(Debug)]
pub struct UdpDriver {
    sockets: Vec<BoundSocket>,
    pending: VecDeque<UdpDatagram>,
    rx_buf: Box<[u8]>,
    stats: UdpStats,
}

impl Default for UdpDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpDriver {
    pub fn new() -> Self {
        Self {
            sockets: Vec::new(),
            pending: VecDeque::new(),
            rx_buf: vec![0u8; MAX_DATAGRAM_SIZE].into_boxed_slice(),
            stats: UdpStats::default(),
        }
    }

    /// Addresses actually bound, in configuration order
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.sockets.iter().map(|bound| bound.local).collect()
    }

    pub fn stats(&self) -> UdpStats {
        self.stats
    }

    /// Socket bound to `local`, or the first socket of the same family
    fn route(&self, local: SocketAddr) -> Option<&BoundSocket> {
        self.sockets
            .iter()
            .find(|bound| bound.local == local)
            .or_else(|| {
                self.sockets
                    .iter()
                    .find(|bound| bound.local.is_ipv4() == local.is_ipv4())
            })
    }

    /// Send `datagram`. Returns false if the socket was busy.
    fn send(&mut self, datagram: UdpDatagram) -> Result<bool, DriverError> {
        let Some(bound) = self.route(datagram.local) else {
            self.stats.tx_dropped += 1;
            warn!(local = %datagram.local, "No socket for outbound datagram");
            return Ok(true);
        };

        match bound.socket.send_to(&datagram.payload, datagram.peer) {
            Ok(_) => {
                trace!(
                    local = %bound.local,
                    peer = %datagram.peer,
                    len = datagram.payload.len(),
                    "UDP sent"
                );
                self.stats.tx_datagrams += 1;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.pending.push_front(datagram);
                Ok(false)
            }
            Err(e) => {
                self.stats.tx_dropped += 1;
                Err(e.into())
            }
        }
    }
}

impl Driver for UdpDriver {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Udp
    }

    fn init(&mut self, config: &PlatformConfig) -> Result<(), DriverError> {
        let mut bound = Vec::with_capacity(config.udp_bind.len());

        // Sockets bound so far are dropped if a later bind fails.
        for addr in &config.udp_bind {
            let socket = UdpSocket::bind(addr)?;
            socket.set_nonblocking(true)?;
            let local = socket.local_addr()?;
            debug!(requested = %addr, %local, "UDP socket bound");
            bound.push(BoundSocket { socket, local });
        }

        self.sockets = bound;
        Ok(())
    }

    fn deinit(&mut self) {
        self.sockets.clear();
        self.pending.clear();
    }

    fn update(&mut self, ctx: &mut MainloopContext, _alarms: &AlarmService) {
        for bound in &self.sockets {
            let handle = bound.socket.as_raw_fd();
            ctx.add_read(handle);
            if !self.pending.is_empty() {
                ctx.add_write(handle);
            }
        }
    }

    fn process(&mut self, ctx: &MainloopContext, host: &mut Host<'_>) -> Result<(), DriverError> {
        for bound in &self.sockets {
            if !ctx.is_readable(bound.socket.as_raw_fd()) {
                continue;
            }
            loop {
                match bound.socket.recv_from(&mut self.rx_buf) {
                    Ok((len, peer)) => {
                        trace!(local = %bound.local, %peer, len, "UDP received");
                        self.stats.rx_datagrams += 1;
                        host.instance.udp_received(UdpDatagram {
                            local: bound.local,
                            peer,
                            payload: Bytes::copy_from_slice(&self.rx_buf[..len]),
                        });
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => return Err(e.into()),
                }
            }
        }

        while let Some(datagram) = self.pending.pop_front() {
            if !self.send(datagram)? {
                return Ok(());
            }
        }

        while let Some(datagram) = host.instance.next_udp_transmit() {
            if !self.send(datagram)? {
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_with_no_sockets() {
        let mut driver = UdpDriver::new();
        driver.init(&PlatformConfig::default()).unwrap();
        assert!(driver.local_addrs().is_empty());

        let mut ctx = MainloopContext::new();
        driver.update(&mut ctx, &AlarmService::new(Box::new(tern_core::VirtualClock::new())));
        assert!(ctx.interest_handles().is_empty());
    }

    #[test]
    fn test_bind_resolves_ephemeral_port() {
        let config = PlatformConfig::default().with_udp_bind("127.0.0.1:0".parse().unwrap());
        let mut driver = UdpDriver::new();
        driver.init(&config).unwrap();

        let addrs = driver.local_addrs();
        assert_eq!(addrs.len(), 1);
        assert_ne!(addrs[0].port(), 0);

        driver.deinit();
        driver.deinit();
        assert!(driver.local_addrs().is_empty());
    }

    #[test]
    fn test_route_prefers_exact_match() {
        let config = PlatformConfig::default()
            .with_udp_bind("127.0.0.1:0".parse().unwrap())
            .with_udp_bind("127.0.0.1:0".parse().unwrap());
        let mut driver = UdpDriver::new();
        driver.init(&config).unwrap();
        let addrs = driver.local_addrs();

        assert_eq!(driver.route(addrs[1]).unwrap().local, addrs[1]);
        let unbound: SocketAddr = "127.0.0.1:1".parse().unwrap();
        assert_eq!(driver.route(unbound).unwrap().local, addrs[0]);
        let v6: SocketAddr = "[::1]:1".parse().unwrap();
        assert!(driver.route(v6).is_none());
    }
}
