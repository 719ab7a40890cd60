//! Synchronization channel to the simulation coordinator

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tern_core::VirtualTimeConfig;
use tracing::debug;

use crate::error::SimResult;

/// Datagram transport between a node and the coordinator
pub trait SyncChannel: Send {
    /// Send one datagram to the coordinator
    fn send(&mut self, datagram: &[u8]) -> SimResult<()>;

    /// Block until the next datagram arrives, returning its length
    fn recv(&mut self, buf: &mut [u8]) -> SimResult<usize>;
}

/// Loopback UDP channel on the simulation port range
#[derive(Debug)]
pub struct UdpSyncChannel {
    socket: UdpSocket,
    coordinator: SocketAddr,
}

impl UdpSyncChannel {
    /// Bind this node's port and target the coordinator's
    pub fn bind(config: &VirtualTimeConfig) -> SimResult<Self> {
        let local = SocketAddr::from((Ipv4Addr::LOCALHOST, config.node_port()?));
        let coordinator = SocketAddr::from((Ipv4Addr::LOCALHOST, config.coordinator_port()?));
        let socket = UdpSocket::bind(local)?;
        debug!(node_id = config.node_id, %local, %coordinator, "Sync channel bound");
        Ok(Self {
            socket,
            coordinator,
        })
    }

    pub fn local_addr(&self) -> SimResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn coordinator(&self) -> SocketAddr {
        self.coordinator
    }
}

impl SyncChannel for UdpSyncChannel {
    fn send(&mut self, datagram: &[u8]) -> SimResult<()> {
        self.socket.send_to(datagram, self.coordinator)?;
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> SimResult<usize> {
        loop {
            match self.socket.recv(buf) {
                Ok(len) => return Ok(len),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    inbound: VecDeque<Bytes>,
    outbound: Vec<Bytes>,
}

/// Scripted in-process channel.
///
/// Datagrams queued through a [`MemoryChannelHandle`] are returned by
/// `recv` in order. Receiving with nothing queued is an error rather than a
/// hang.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    script: Arc<Mutex<Script>>,
}

/// Test-side view of a [`MemoryChannel`]
#[derive(Debug, Clone)]
pub struct MemoryChannelHandle {
    script: Arc<Mutex<Script>>,
}

impl MemoryChannel {
    /// Create a channel and the handle that drives it
    pub fn new() -> (Self, MemoryChannelHandle) {
        let channel = Self::default();
        let handle = MemoryChannelHandle {
            script: channel.script.clone(),
        };
        (channel, handle)
    }
}

impl MemoryChannelHandle {
    /// Queue a datagram for the node to receive
    pub fn push(&self, datagram: impl Into<Bytes>) {
        self.script.lock().inbound.push_back(datagram.into());
    }

    /// Datagrams the node has sent so far
    pub fn sent(&self) -> Vec<Bytes> {
        self.script.lock().outbound.clone()
    }

    /// Datagrams still waiting to be received
    pub fn pending(&self) -> usize {
        self.script.lock().inbound.len()
    }
}

impl SyncChannel for MemoryChannel {
    fn send(&mut self, datagram: &[u8]) -> SimResult<()> {
        self.script
            .lock()
            .outbound
            .push(Bytes::copy_from_slice(datagram));
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> SimResult<usize> {
        let datagram = self.script.lock().inbound.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted event queued")
        })?;
        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok(len)
    }
}
