//! # Radio Driver
//!
//! Moves frames between the protocol engine and a radio co-processor link.
//!
//! The link is pluggable through [`FrameLink`]:
//!
//! - [`UnixFrameLink`]: a Unix datagram socket to an RCP process
//! - a virtual-time link, which publishes outbound frames as simulation
//!   events and has no OS handle
//!
//! Inbound frames come either from the link's handle, when the wait reports
//! it readable, or from deliveries a virtual-time wait injected into the
//! context. Both reach [`Instance::radio_received`](tern_core::Instance).

use std::fmt::Write as _;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tern_core::{
    AlarmService, ChangedFlags, Driver, DriverError, DriverKind, Handle, Host, MainloopContext,
    PlatformConfig, RadioUrl, StringWriter,
};
use tracing::{Level, debug, enabled, trace, warn};

/// Largest frame a Unix link carries
pub const MAX_FRAME_SIZE: usize = 2048;

/// Most frames read from the link handle in one process step
const MAX_RX_BURST: usize = 32;

/// A bidirectional frame transport to the radio
pub trait FrameLink: Send {
    /// Short description for logs
    fn name(&self) -> &'static str;

    /// Connect the link
    fn open(&mut self, config: &PlatformConfig) -> Result<(), DriverError>;

    /// Disconnect. Safe to call when not open.
    fn close(&mut self);

    /// Handle to wait on for inbound frames, if the link has one
    fn handle(&self) -> Option<Handle>;

    /// Largest frame [`send_frame`](FrameLink::send_frame) accepts
    fn max_frame_size(&self) -> usize;

    /// Send one frame.
    ///
    /// A link that cannot take the frame right now returns an I/O error of
    /// kind `WouldBlock`.
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), DriverError>;

    /// Receive one frame without blocking
    fn recv_frame(&mut self) -> Result<Option<Bytes>, DriverError>;
}

/// Frame and byte counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioStats {
    pub rx_frames: u64,
    pub rx_bytes: u64,
    pub tx_frames: u64,
    pub tx_bytes: u64,
    pub tx_dropped: u64,
}

/// Driver bridging a [`FrameLink`] and the protocol engine
pub struct RadioDriver {
    link: Box<dyn FrameLink>,
    initialized: bool,
    pending_tx: Option<Bytes>,
    stats: RadioStats,
    last_change: ChangedFlags,
}

impl RadioDriver {
    pub fn new(link: Box<dyn FrameLink>) -> Self {
        Self {
            link,
            initialized: false,
            pending_tx: None,
            stats: RadioStats::default(),
            last_change: ChangedFlags::NONE,
        }
    }

    pub fn stats(&self) -> RadioStats {
        self.stats
    }

    /// Flags from the most recent state change notification
    pub fn last_state_change(&self) -> ChangedFlags {
        self.last_change
    }

    fn deliver(&mut self, frame: &[u8], host: &mut Host<'_>) {
        self.stats.rx_frames += 1;
        self.stats.rx_bytes += frame.len() as u64;
        log_frame("rx", frame);
        host.instance.radio_received(frame);
    }

    /// Send `frame`, parking it if the link is busy.
    ///
    /// Returns false when the frame was parked.
    fn transmit(&mut self, frame: Bytes) -> Result<bool, DriverError> {
        let limit = self.link.max_frame_size();
        if frame.len() > limit {
            self.stats.tx_dropped += 1;
            return Err(DriverError::FrameTooLarge {
                size: frame.len(),
                limit,
            });
        }

        match self.link.send_frame(&frame) {
            Ok(()) => {
                self.stats.tx_frames += 1;
                self.stats.tx_bytes += frame.len() as u64;
                log_frame("tx", &frame);
                Ok(true)
            }
            Err(DriverError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                trace!(link = self.link.name(), len = frame.len(), "Link busy, frame parked");
                self.pending_tx = Some(frame);
                Ok(false)
            }
            Err(e) => {
                self.stats.tx_dropped += 1;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for RadioDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioDriver")
            .field("link", &self.link.name())
            .field("initialized", &self.initialized)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Driver for RadioDriver {
    fn name(&self) -> &'static str {
        "radio"
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Radio
    }

    fn init(&mut self, config: &PlatformConfig) -> Result<(), DriverError> {
        self.link.open(config)?;
        self.initialized = true;
        debug!(link = self.link.name(), "Radio link open");
        Ok(())
    }

    fn deinit(&mut self) {
        if self.initialized {
            debug!(link = self.link.name(), stats = ?self.stats, "Radio link closed");
        }
        self.link.close();
        self.pending_tx = None;
        self.initialized = false;
    }

    fn update(&mut self, ctx: &mut MainloopContext, _alarms: &AlarmService) {
        match self.link.handle() {
            Some(handle) => {
                ctx.add_read(handle);
                if self.pending_tx.is_some() {
                    ctx.add_write(handle);
                }
            }
            None if self.pending_tx.is_some() => ctx.tighten_timeout(Duration::ZERO),
            None => {}
        }
    }

    fn process(&mut self, ctx: &MainloopContext, host: &mut Host<'_>) -> Result<(), DriverError> {
        if !self.initialized {
            return Err(DriverError::NotInitialized);
        }

        for delivery in ctx.deliveries() {
            self.deliver(delivery.payload(), host);
        }

        if let Some(handle) = self.link.handle() {
            if ctx.is_readable(handle) {
                for _ in 0..MAX_RX_BURST {
                    match self.link.recv_frame()? {
                        Some(frame) => self.deliver(&frame, host),
                        None => break,
                    }
                }
            }
        }

        if let Some(frame) = self.pending_tx.take() {
            if !self.transmit(frame)? {
                return Ok(());
            }
        }

        while let Some(frame) = host.instance.next_radio_transmit() {
            if !self.transmit(frame)? {
                break;
            }
        }

        Ok(())
    }

    fn on_state_change(&mut self, flags: ChangedFlags) {
        trace!(?flags, "Radio saw state change");
        self.last_change = flags;
    }
}

/// Trace-level hex dump of a frame's first bytes
fn log_frame(direction: &'static str, frame: &[u8]) {
    if !enabled!(Level::TRACE) {
        return;
    }
    let mut buf = [0u8; 80];
    let mut line = StringWriter::new(&mut buf);
    for byte in frame {
        if write!(line, "{:02x}", byte).is_err() {
            break;
        }
    }
    trace!(
        direction,
        len = frame.len(),
        bytes = line.as_str().unwrap_or_default(),
        "Radio frame"
    );
}

/// Frame link over a Unix datagram socket.
///
/// Binds a local socket path and connects to the RCP's path. The URL form is
/// `spinel+unix:///path/to/rcp.sock?local=/path/to/host.sock`; without
/// `local` the host side binds `<rcp path>.host`.
#[derive(Debug)]
pub struct UnixFrameLink {
    peer: PathBuf,
    local: PathBuf,
    socket: Option<UnixDatagram>,
}

impl UnixFrameLink {
    pub fn new(peer: impl Into<PathBuf>, local: impl Into<PathBuf>) -> Self {
        Self {
            peer: peer.into(),
            local: local.into(),
            socket: None,
        }
    }

    /// Build a link from a `spinel+unix` radio URL
    pub fn from_url(url: &RadioUrl) -> Result<Self, DriverError> {
        if !url.uses("unix") {
            return Err(DriverError::InvalidConfig(format!(
                "radio URL '{}' is not a unix socket link",
                url
            )));
        }
        let peer = PathBuf::from(url.path());
        let local = match url.param("local") {
            Some(local) if !local.is_empty() => PathBuf::from(local),
            _ => {
                let mut local = peer.clone().into_os_string();
                local.push(".host");
                PathBuf::from(local)
            }
        };
        Ok(Self::new(peer, local))
    }

    pub fn peer_path(&self) -> &Path {
        &self.peer
    }

    pub fn local_path(&self) -> &Path {
        &self.local
    }

    fn socket(&self) -> Result<&UnixDatagram, DriverError> {
        self.socket.as_ref().ok_or(DriverError::NotInitialized)
    }
}

impl FrameLink for UnixFrameLink {
    fn name(&self) -> &'static str {
        "unix"
    }

    fn open(&mut self, _config: &PlatformConfig) -> Result<(), DriverError> {
        if self.socket.is_some() {
            return Ok(());
        }
        // A stale socket file from an earlier run blocks the bind.
        if self.local.exists() {
            std::fs::remove_file(&self.local)?;
        }
        let socket = UnixDatagram::bind(&self.local)?;
        let connected = socket
            .connect(&self.peer)
            .and_then(|()| socket.set_nonblocking(true));
        if let Err(e) = connected {
            drop(socket);
            let _ = std::fs::remove_file(&self.local);
            return Err(e.into());
        }
        self.socket = Some(socket);
        Ok(())
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            let _ = std::fs::remove_file(&self.local);
        }
    }

    fn handle(&self) -> Option<Handle> {
        self.socket.as_ref().map(|socket| socket.as_raw_fd())
    }

    fn max_frame_size(&self) -> usize {
        MAX_FRAME_SIZE
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), DriverError> {
        match self.socket()?.send(frame) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => Err(DriverError::LinkClosed),
            Err(e) => Err(e.into()),
        }
    }

    fn recv_frame(&mut self) -> Result<Option<Bytes>, DriverError> {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        match self.socket()?.recv(&mut buf) {
            Ok(len) => Ok(Some(Bytes::copy_from_slice(&buf[..len]))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => {
                warn!(peer = %self.peer.display(), error = %e, "Radio link receive failed");
                Err(e.into())
            }
        }
    }
}

impl Drop for UnixFrameLink {
    fn drop(&mut self) {
        self.close();
    }
}
