//! # Platform Scenario Tests
//!
//! End-to-end runs of an assembled platform:
//! - Real-clock alarms and driver timeouts
//! - Virtual-time alarms and protocol violations
//! - UDP and Unix radio traffic through the poll waiter
//! - Seeded random schedules under virtual time

use std::collections::VecDeque;
use std::net::{SocketAddr, UdpSocket};
use std::os::unix::net::UnixDatagram;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tern_core::{
    AlarmDomain, AlarmService, Driver, DriverError, DriverKind, Host, Instance, MainloopContext,
    MainloopError, PlatformConfig, RadioUrl, UdpDatagram, VirtualTimeConfig,
};
use tern_platform::{Platform, PlatformError};
use tern_sim::{EventKind, MemoryChannel, MemoryChannelHandle, VirtualTimeEngine, VirtualTimeEvent};

#[derive(Default)]
struct Stack {
    fired: Vec<(AlarmDomain, u64)>,
    frames: Vec<Vec<u8>>,
    outbound: VecDeque<Bytes>,
    datagrams: Vec<UdpDatagram>,
    replies: VecDeque<UdpDatagram>,
}

impl Instance for Stack {
    fn alarm_fired(&mut self, domain: AlarmDomain, alarms: &mut AlarmService) {
        self.fired.push((domain, alarms.now_micros()));
    }

    fn radio_received(&mut self, frame: &[u8]) {
        self.frames.push(frame.to_vec());
    }

    fn next_radio_transmit(&mut self) -> Option<Bytes> {
        self.outbound.pop_front()
    }

    fn udp_received(&mut self, datagram: UdpDatagram) {
        self.datagrams.push(datagram);
    }

    fn next_udp_transmit(&mut self) -> Option<UdpDatagram> {
        self.replies.pop_front()
    }
}

/// Per-driver record of whether its own deadline had passed at process time
type ExpiryLog = Arc<Mutex<Vec<(&'static str, bool)>>>;

/// Contributes a fixed timeout and checks it during process
struct TimeoutDriver {
    name: &'static str,
    timeout: Duration,
    deadline: Option<Instant>,
    log: ExpiryLog,
}

impl TimeoutDriver {
    fn new(name: &'static str, timeout: Duration, log: &ExpiryLog) -> Self {
        Self {
            name,
            timeout,
            deadline: None,
            log: log.clone(),
        }
    }
}

impl Driver for TimeoutDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Custom
    }

    fn init(&mut self, _config: &PlatformConfig) -> Result<(), DriverError> {
        Ok(())
    }

    fn deinit(&mut self) {}

    fn update(&mut self, ctx: &mut MainloopContext, _alarms: &AlarmService) {
        self.deadline = Some(Instant::now() + self.timeout);
        ctx.tighten_timeout(self.timeout);
    }

    fn process(&mut self, _ctx: &MainloopContext, _host: &mut Host<'_>) -> Result<(), DriverError> {
        let expired = self.deadline.is_some_and(|deadline| Instant::now() >= deadline);
        self.log.lock().unwrap().push((self.name, expired));
        Ok(())
    }
}

fn simulated_platform(node_id: u16) -> (Platform, MemoryChannelHandle) {
    let (channel, handle) = MemoryChannel::new();
    let mut engine = VirtualTimeEngine::new(VirtualTimeConfig::new(node_id));
    engine.attach(Box::new(channel));
    let mut platform = Platform::with_engine(PlatformConfig::simulation(node_id), engine).unwrap();
    platform.init().unwrap();
    (platform, handle)
}

fn event(delay: u64, kind: EventKind, payload: &[u8]) -> Bytes {
    VirtualTimeEvent::new(delay, kind, Bytes::copy_from_slice(payload))
        .unwrap()
        .encode()
}

fn free_local_addr() -> SocketAddr {
    let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap()
}

/// Test 1: A 50ms alarm fires once, no earlier than 50ms, and is then
/// reported as not armed
#[test]
fn test_real_clock_alarm_fires_once() {
    let mut platform = Platform::new(PlatformConfig::default()).unwrap();
    platform.init().unwrap();
    let mut stack = Stack::default();

    let start = Instant::now();
    let now = platform.alarms().now_micros();
    platform.alarms_mut().start_at(AlarmDomain::Micro, now, 50_000);

    platform
        .run_until(&mut stack, |_, alarms| alarms.fired_count() > 0)
        .unwrap();
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(stack.fired.len(), 1);
    assert_eq!(stack.fired[0].0, AlarmDomain::Micro);
    assert!(stack.fired[0].1 >= now + 50_000);
    assert_eq!(platform.alarms().remaining(AlarmDomain::Micro), None);
    assert_eq!(platform.alarms().next_remaining(), None);

    // A later millisecond alarm bounds the next wait; the first does not refire.
    let now_ms = platform.alarms().now_millis();
    platform.alarms_mut().start_at(AlarmDomain::Milli, now_ms, 20);
    platform
        .run_until(&mut stack, |_, alarms| alarms.fired_count() > 1)
        .unwrap();
    let domains: Vec<_> = stack.fired.iter().map(|(d, _)| *d).collect();
    assert_eq!(domains, vec![AlarmDomain::Micro, AlarmDomain::Milli]);
    assert_eq!(platform.alarms().remaining(AlarmDomain::Milli), None);
}

/// Test 2: With 10ms and 30ms driver timeouts one iteration waits about 10ms
/// and only the 10ms driver finds its deadline passed
#[test]
fn test_smallest_driver_timeout_wins() {
    let log = ExpiryLog::default();
    let mut platform = Platform::new(PlatformConfig::default()).unwrap();
    platform
        .register(Box::new(TimeoutDriver::new("fast", Duration::from_millis(10), &log)))
        .unwrap();
    platform
        .register(Box::new(TimeoutDriver::new("slow", Duration::from_millis(30), &log)))
        .unwrap();
    platform.init().unwrap();

    let start = Instant::now();
    let report = platform.run_iteration(&mut Stack::default()).unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(10), "woke early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(30), "waited too long: {:?}", elapsed);
    assert_eq!(report.ready, 0);
    assert_eq!(report.processed, 4);
    assert!(report.failed.is_empty());
    assert_eq!(*log.lock().unwrap(), vec![("fast", true), ("slow", false)]);
}

/// Test 3: Under virtual time an alarm due at 100µs fires on a 100µs event
#[test]
fn test_virtual_alarm_fires_on_event() {
    let (mut platform, handle) = simulated_platform(1);
    let mut stack = Stack::default();
    platform.alarms_mut().set_alarm(AlarmDomain::Micro, 100);
    handle.push(event(100, EventKind::AlarmFired, &[]));

    platform.run_iteration(&mut stack).unwrap();

    assert_eq!(stack.fired, vec![(AlarmDomain::Micro, 100)]);
    assert_eq!(platform.alarms().now_micros(), 100);
    let sleep = VirtualTimeEvent::decode(&handle.sent()[0]).unwrap();
    assert_eq!(sleep.kind(), EventKind::AlarmFired);
    assert_eq!(sleep.delay(), 100);
}

/// Test 4: An event longer than 1024 bytes ends the run and time stays put
#[test]
fn test_oversized_event_rejected() {
    let (mut platform, handle) = simulated_platform(2);
    let mut raw = Vec::new();
    raw.extend_from_slice(&250u64.to_le_bytes());
    raw.push(EventKind::UartWrite as u8);
    raw.extend_from_slice(&1025u16.to_le_bytes());
    raw.resize(11 + 1025, b'x');
    handle.push(raw);

    let err = platform.run_iteration(&mut Stack::default()).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        PlatformError::Mainloop(MainloopError::Wait {
            subsystem: "virtual-time",
            ..
        })
    ));
    assert_eq!(platform.alarms().now_micros(), 0);
}

/// Test 5: A payload of exactly 1024 bytes is accepted
#[test]
fn test_max_payload_accepted() {
    let (mut platform, handle) = simulated_platform(3);
    let mut stack = Stack::default();
    let payload = vec![0xa5; 1024];
    handle.push(event(7, EventKind::RadioReceived, &payload));

    platform.run_iteration(&mut stack).unwrap();
    assert_eq!(stack.frames, vec![payload]);
    assert_eq!(platform.alarms().now_micros(), 7);
}

/// Test 6: Iterations with nothing ready and nothing due change nothing
#[test]
fn test_idle_iterations_are_idempotent() {
    let (mut platform, handle) = simulated_platform(4);
    let mut stack = Stack::default();
    platform.alarms_mut().set_alarm(AlarmDomain::Micro, 1_000);

    for _ in 0..10 {
        handle.push(event(0, EventKind::AlarmFired, &[]));
        let report = platform.run_iteration(&mut stack).unwrap();
        assert_eq!(report.ready, 0);
        assert!(report.failed.is_empty());
    }

    assert!(stack.fired.is_empty());
    assert!(stack.frames.is_empty());
    assert_eq!(platform.alarms().now_micros(), 0);
    assert_eq!(platform.alarms().fired_count(), 0);
    assert!(platform.alarms().is_armed(AlarmDomain::Micro));
}

/// Test 7: Random schedules over both domains fire each alarm exactly once,
/// never early, and the clock is the sum of the delays
#[test]
fn test_random_schedule_properties() {
    let (mut platform, handle) = simulated_platform(5);
    let mut rng = StdRng::seed_from_u64(0x7e57);
    let mut stack = Stack::default();
    let mut total = 0u64;
    let mut armed: [Option<u64>; 2] = [None, None];
    let mut expected_fires = 0usize;

    for _ in 0..1_000 {
        let now = platform.alarms().now_micros();
        if rng.random_bool(0.3) {
            let dt = rng.random_range(0..5_000u64);
            platform.alarms_mut().start_at(AlarmDomain::Micro, now, dt);
            armed[1] = Some(now + dt);
        }
        if rng.random_bool(0.1) {
            let now_ms = platform.alarms().now_millis();
            let dt = rng.random_range(0..5u64);
            platform.alarms_mut().start_at(AlarmDomain::Milli, now_ms, dt);
            armed[0] = Some((now_ms + dt) * 1_000);
        }
        if rng.random_bool(0.05) {
            platform.alarms_mut().cancel(AlarmDomain::Micro);
            armed[1] = None;
        }

        let delay = rng.random_range(0..=2_000u64);
        total += delay;
        handle.push(event(delay, EventKind::AlarmFired, &[]));
        let before = stack.fired.len();
        platform.run_iteration(&mut stack).unwrap();
        assert_eq!(platform.alarms().now_micros(), total);

        for slot in armed.iter_mut() {
            if slot.is_some_and(|at| at <= total) {
                *slot = None;
                expected_fires += 1;
            }
        }
        for (_, at) in &stack.fired[before..] {
            assert_eq!(*at, total);
        }
        assert_eq!(stack.fired.len(), expected_fires);
    }
}

/// Test 8: Datagrams reach the stack and replies go out through the UDP driver
#[test]
fn test_udp_round_trip() {
    let addr = free_local_addr();
    let mut platform = Platform::new(PlatformConfig::default().with_udp_bind(addr)).unwrap();
    platform.init().unwrap();

    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    peer.send_to(b"ping", addr).unwrap();

    let mut stack = Stack::default();
    let now = platform.alarms().now_micros();
    platform.alarms_mut().start_at(AlarmDomain::Micro, now, 1_000_000);
    platform.run_until(&mut stack, |_, _| true).unwrap();

    assert_eq!(stack.datagrams.len(), 1);
    let received = &stack.datagrams[0];
    assert_eq!(received.payload.as_ref(), b"ping");
    assert_eq!(received.peer, peer.local_addr().unwrap());

    stack
        .replies
        .push_back(UdpDatagram::new(addr, received.peer, &b"pong"[..]));
    let now = platform.alarms().now_micros();
    platform.alarms_mut().start_at(AlarmDomain::Micro, now, 1_000);
    platform.run_iteration(&mut stack).unwrap();

    let mut buf = [0u8; 16];
    let (len, from) = peer.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..len], b"pong");
    assert_eq!(from, addr);
}

/// Test 9: Spinel frames cross a Unix socket radio link both ways
#[test]
fn test_unix_radio_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let rcp_path = dir.path().join("rcp");
    let rcp = UnixDatagram::bind(&rcp_path).unwrap();
    rcp.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let url = RadioUrl::parse(&format!("spinel+unix://{}", rcp_path.display())).unwrap();
    let mut platform = Platform::new(PlatformConfig::default().with_radio_url(url)).unwrap();
    platform.init().unwrap();
    assert_eq!(platform.driver_names(), vec!["alarm", "radio", "udp"]);

    rcp.send_to(&[0x80, 0x06, 0x00, 0x01], dir.path().join("rcp.host"))
        .unwrap();

    let mut stack = Stack::default();
    stack.outbound.push_back(Bytes::from_static(&[0x81, 0x02, 0x01]));
    let now = platform.alarms().now_micros();
    platform.alarms_mut().start_at(AlarmDomain::Micro, now, 1_000_000);
    platform.run_iteration(&mut stack).unwrap();

    assert_eq!(stack.frames, vec![vec![0x80, 0x06, 0x00, 0x01]]);
    let mut buf = [0u8; 64];
    let len = rcp.recv(&mut buf).unwrap();
    assert_eq!(&buf[..len], &[0x81, 0x02, 0x01]);

    platform.deinit();
    assert!(!dir.path().join("rcp.host").exists());
}
