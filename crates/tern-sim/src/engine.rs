//! # Virtual Time Engine
//!
//! Replaces the blocking wait with events from a simulation coordinator.
//!
//! Each node announces how long it intends to sleep, then blocks until the
//! coordinator sends the next event. The event's delay is applied to the
//! node's virtual clock before the event takes effect, so alarms due inside
//! that window fire first.
//!
//! ```text
//! node                          coordinator
//!  │ ── AlarmFired(delay=timeout) ──► │
//!  │ ◄──── event(delay, kind) ─────── │
//!  │ advance clock by delay           │
//!  │ apply event                      │
//! ```

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tern_core::{Delivery, Host, MainloopContext, VirtualTimeConfig};
use tracing::{debug, info, trace, warn};

use crate::channel::{SyncChannel, UdpSyncChannel};
use crate::error::{SimError, SimResult};
use crate::event::{EventKind, MAX_EVENT_SIZE, VirtualTimeEvent};

/// Engine shared between the waiter and the virtual radio link
pub type SharedEngine = Arc<Mutex<VirtualTimeEngine>>;

/// Event counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub events_sent: u64,
    pub events_received: u64,
    pub alarms_fired: u64,
    pub console_bytes: u64,
}

/// The per-node virtual time engine
pub struct VirtualTimeEngine {
    config: VirtualTimeConfig,
    channel: Option<Box<dyn SyncChannel>>,
    console: Box<dyn Write + Send>,
    recv_buf: Box<[u8]>,
    stats: EngineStats,
}

impl VirtualTimeEngine {
    /// Create an engine writing console output to stdout
    pub fn new(config: VirtualTimeConfig) -> Self {
        Self {
            config,
            channel: None,
            console: Box::new(io::stdout()),
            recv_buf: vec![0u8; MAX_EVENT_SIZE].into_boxed_slice(),
            stats: EngineStats::default(),
        }
    }

    /// Redirect `UartWrite` payloads
    pub fn with_console(mut self, console: Box<dyn Write + Send>) -> Self {
        self.console = console;
        self
    }

    /// Wrap in the shared handle used by the waiter and radio link
    pub fn into_shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &VirtualTimeConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn is_initialized(&self) -> bool {
        self.channel.is_some()
    }

    /// Bind the UDP sync channel on this node's simulation port
    pub fn init(&mut self) -> SimResult<()> {
        if self.channel.is_some() {
            return Ok(());
        }
        let channel = UdpSyncChannel::bind(&self.config)?;
        self.attach(Box::new(channel));
        Ok(())
    }

    /// Use `channel` instead of binding a UDP socket
    pub fn attach(&mut self, channel: Box<dyn SyncChannel>) {
        info!(node_id = self.config.node_id, "Virtual time engine initialized");
        self.channel = Some(channel);
    }

    /// Close the sync channel
    pub fn deinit(&mut self) {
        if self.channel.take().is_some() {
            debug!(
                node_id = self.config.node_id,
                stats = ?self.stats,
                "Virtual time engine closed"
            );
        }
    }

    fn channel(&mut self) -> SimResult<&mut Box<dyn SyncChannel>> {
        self.channel.as_mut().ok_or(SimError::NotInitialized)
    }

    /// Send one event to the coordinator
    pub fn send_event(&mut self, event: &VirtualTimeEvent) -> SimResult<()> {
        let wire = event.encode();
        self.channel()?.send(&wire)?;
        self.stats.events_sent += 1;
        trace!(
            kind = %event.kind(),
            delay = event.delay(),
            len = event.payload().len(),
            "Event sent"
        );
        Ok(())
    }

    /// Announce that this node will sleep for `timeout`, or until woken
    pub fn send_sleep_event(&mut self, timeout: Option<Duration>) -> SimResult<()> {
        self.send_event(&VirtualTimeEvent::sleep(timeout))
    }

    /// Publish a spinel frame written to the simulated RCP
    pub fn send_radio_spinel_write_event(&mut self, frame: &[u8]) -> SimResult<()> {
        let event = VirtualTimeEvent::spinel_write(Bytes::copy_from_slice(frame))?;
        self.send_event(&event)
    }

    /// Block for the next event from the coordinator
    pub fn receive_event(&mut self) -> SimResult<VirtualTimeEvent> {
        let mut buf = std::mem::take(&mut self.recv_buf);
        let received = self.channel().and_then(|channel| channel.recv(&mut buf));
        let result = received.and_then(|len| VirtualTimeEvent::decode(&buf[..len]));
        self.recv_buf = buf;

        match &result {
            Ok(event) => {
                self.stats.events_received += 1;
                trace!(
                    kind = %event.kind(),
                    delay = event.delay(),
                    len = event.payload().len(),
                    "Event received"
                );
            }
            Err(e) if e.is_protocol_violation() => {
                warn!(node_id = self.config.node_id, error = %e, "Rejected event from coordinator");
            }
            Err(_) => {}
        }
        result
    }

    /// Apply an event: advance the clock by its delay, then deliver it.
    ///
    /// Returns the number of alarms that fired. A clock overflow leaves the
    /// clock unchanged. A console write failure is reported after the delay
    /// has been applied.
    pub fn dispatch(
        &mut self,
        event: VirtualTimeEvent,
        ctx: &mut MainloopContext,
        host: &mut Host<'_>,
    ) -> SimResult<usize> {
        let fired = host.alarms.advance_now(event.delay(), &mut *host.instance)?;
        self.stats.alarms_fired += fired as u64;

        match event.kind() {
            EventKind::AlarmFired => {}
            EventKind::RadioReceived => {
                ctx.push_delivery(Delivery::RadioFrame(event.payload().clone()));
            }
            EventKind::RadioSpinelWrite => {
                ctx.push_delivery(Delivery::SpinelFrame(event.payload().clone()));
            }
            EventKind::UartWrite => {
                self.console.write_all(event.payload())?;
                self.console.flush()?;
                self.stats.console_bytes += event.payload().len() as u64;
            }
        }

        Ok(fired)
    }
}

impl std::fmt::Debug for VirtualTimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualTimeEngine")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Drop for VirtualTimeEngine {
    fn drop(&mut self) {
        self.deinit();
    }
}

#[cfg(test)]
mod tests {
    use tern_core::{AlarmDomain, AlarmService, Instance, VirtualClock};

    use super::*;
    use crate::channel::MemoryChannel;

    #[derive(Default)]
    struct Engine {
        fired_at: Vec<u64>,
    }

    impl Instance for Engine {
        fn alarm_fired(&mut self, _domain: AlarmDomain, alarms: &mut AlarmService) {
            self.fired_at.push(alarms.now_micros());
        }
    }

    /// Console sink shared with the test
    #[derive(Clone, Default)]
    struct Console(Arc<Mutex<Vec<u8>>>);

    impl Write for Console {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Console whose writes always fail
    struct BrokenConsole;

    impl Write for BrokenConsole {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "console closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn engine() -> (VirtualTimeEngine, crate::channel::MemoryChannelHandle) {
        let (channel, handle) = MemoryChannel::new();
        let mut engine = VirtualTimeEngine::new(VirtualTimeConfig::new(1));
        engine.attach(Box::new(channel));
        (engine, handle)
    }

    #[test]
    fn test_uninitialized_engine() {
        let mut engine = VirtualTimeEngine::new(VirtualTimeConfig::new(1));
        assert!(matches!(
            engine.send_sleep_event(None),
            Err(SimError::NotInitialized)
        ));
        assert!(matches!(engine.receive_event(), Err(SimError::NotInitialized)));
    }

    #[test]
    fn test_sleep_event_on_wire() {
        let (mut engine, handle) = engine();
        engine.send_sleep_event(Some(Duration::from_millis(30))).unwrap();
        let sent = handle.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(VirtualTimeEvent::decode(&sent[0]).unwrap().delay(), 30_000);
        assert_eq!(engine.stats().events_sent, 1);
    }

    #[test]
    fn test_dispatch_fires_alarm_inside_delay() {
        let (mut engine, handle) = engine();
        handle.push(
            VirtualTimeEvent::new(100, EventKind::AlarmFired, Bytes::new())
                .unwrap()
                .encode(),
        );

        let mut alarms = AlarmService::new(Box::new(VirtualClock::new()));
        alarms.set_alarm(AlarmDomain::Micro, 50);
        let mut instance = Engine::default();
        let mut ctx = MainloopContext::new();

        let event = engine.receive_event().unwrap();
        let mut host = Host::new(&mut alarms, &mut instance);
        assert_eq!(engine.dispatch(event, &mut ctx, &mut host).unwrap(), 1);

        assert_eq!(alarms.now_micros(), 100);
        assert_eq!(instance.fired_at, vec![100]);
        assert_eq!(alarms.remaining(AlarmDomain::Micro), None);
    }

    #[test]
    fn test_dispatch_radio_events_become_deliveries() {
        let (mut engine, _handle) = engine();
        let mut alarms = AlarmService::new(Box::new(VirtualClock::new()));
        let mut instance = Engine::default();
        let mut ctx = MainloopContext::new();
        let mut host = Host::new(&mut alarms, &mut instance);

        let radio =
            VirtualTimeEvent::new(5, EventKind::RadioReceived, &b"\x41\x88"[..]).unwrap();
        let spinel =
            VirtualTimeEvent::new(0, EventKind::RadioSpinelWrite, &b"\x80"[..]).unwrap();
        engine.dispatch(radio, &mut ctx, &mut host).unwrap();
        engine.dispatch(spinel, &mut ctx, &mut host).unwrap();

        assert_eq!(
            ctx.deliveries(),
            &[
                Delivery::RadioFrame(Bytes::from_static(b"\x41\x88")),
                Delivery::SpinelFrame(Bytes::from_static(b"\x80")),
            ]
        );
        assert_eq!(host.alarms.now_micros(), 5);
    }

    #[test]
    fn test_dispatch_uart_writes_console() {
        let console = Console::default();
        let (channel, _handle) = MemoryChannel::new();
        let mut engine = VirtualTimeEngine::new(VirtualTimeConfig::new(2))
            .with_console(Box::new(console.clone()));
        engine.attach(Box::new(channel));

        let mut alarms = AlarmService::new(Box::new(VirtualClock::new()));
        let mut instance = Engine::default();
        let mut ctx = MainloopContext::new();
        let mut host = Host::new(&mut alarms, &mut instance);

        let event = VirtualTimeEvent::new(0, EventKind::UartWrite, &b"> "[..]).unwrap();
        engine.dispatch(event, &mut ctx, &mut host).unwrap();
        assert_eq!(console.0.lock().as_slice(), b"> ");
        assert_eq!(engine.stats().console_bytes, 2);
        assert!(ctx.deliveries().is_empty());
    }

    #[test]
    fn test_oversized_event_leaves_clock_unchanged() {
        let (mut engine, handle) = engine();
        let mut raw = Vec::new();
        raw.extend_from_slice(&100u64.to_le_bytes());
        raw.push(EventKind::RadioReceived as u8);
        raw.extend_from_slice(&2000u16.to_le_bytes());
        handle.push(raw);

        let alarms = AlarmService::new(Box::new(VirtualClock::new()));
        let err = engine.receive_event().unwrap_err();
        assert!(matches!(err, SimError::PayloadTooLarge { size: 2000, .. }));
        assert_eq!(alarms.now_micros(), 0);
        assert_eq!(engine.stats().events_received, 0);
    }

    #[test]
    fn test_clock_overflow_is_an_error() {
        let (mut engine, _handle) = engine();
        let mut alarms = AlarmService::new(Box::new(VirtualClock::starting_at(u64::MAX)));
        let mut instance = Engine::default();
        let mut ctx = MainloopContext::new();
        let mut host = Host::new(&mut alarms, &mut instance);

        let event = VirtualTimeEvent::new(1, EventKind::RadioReceived, &b"x"[..]).unwrap();
        assert!(matches!(
            engine.dispatch(event, &mut ctx, &mut host),
            Err(SimError::Clock(_))
        ));
        assert!(ctx.deliveries().is_empty());
    }

    #[test]
    fn test_console_failure_after_delay_applied() {
        let (channel, _handle) = MemoryChannel::new();
        let mut engine =
            VirtualTimeEngine::new(VirtualTimeConfig::new(3)).with_console(Box::new(BrokenConsole));
        engine.attach(Box::new(channel));

        let mut alarms = AlarmService::new(Box::new(VirtualClock::new()));
        alarms.set_alarm(AlarmDomain::Micro, 40);
        let mut instance = Engine::default();
        let mut ctx = MainloopContext::new();
        let mut host = Host::new(&mut alarms, &mut instance);

        let event = VirtualTimeEvent::new(40, EventKind::UartWrite, &b"log"[..]).unwrap();
        assert!(matches!(
            engine.dispatch(event, &mut ctx, &mut host),
            Err(SimError::Io(_))
        ));
        assert_eq!(host.alarms.now_micros(), 40);
        assert_eq!(instance.fired_at, vec![40]);
        assert_eq!(engine.stats().console_bytes, 0);
    }
}
