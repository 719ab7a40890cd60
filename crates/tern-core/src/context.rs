//! Per-iteration mainloop context
//!
//! Drivers add the handles they care about and tighten the deadline during
//! the contribute phase. The waiter fills in readiness, and any frames a
//! virtual-time wait injected, before the process phase reads them back.

use std::collections::BTreeSet;
use std::os::fd::RawFd;
use std::time::Duration;

use bytes::Bytes;

/// OS handle a driver waits on
pub type Handle = RawFd;

/// Ordered set of handles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandleSet(BTreeSet<Handle>);

impl HandleSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle, returning whether it was new
    pub fn insert(&mut self, handle: Handle) -> bool {
        self.0.insert(handle)
    }

    /// Whether the set holds `handle`
    pub fn contains(&self, handle: Handle) -> bool {
        self.0.contains(&handle)
    }

    /// Number of handles
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in ascending handle order
    pub fn iter(&self) -> impl Iterator<Item = Handle> + '_ {
        self.0.iter().copied()
    }
}

/// Frame injected by a virtual-time wait instead of read from a handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Over-the-air frame received by the simulated radio
    RadioFrame(Bytes),
    /// Spinel frame from the simulated RCP
    SpinelFrame(Bytes),
}

impl Delivery {
    /// Payload bytes of the delivery
    pub fn payload(&self) -> &Bytes {
        match self {
            Delivery::RadioFrame(payload) | Delivery::SpinelFrame(payload) => payload,
        }
    }
}

/// The aggregation record for one mainloop iteration
#[derive(Debug, Default)]
pub struct MainloopContext {
    read_interest: HandleSet,
    write_interest: HandleSet,
    error_interest: HandleSet,
    max_handle: Option<Handle>,
    timeout: Option<Duration>,

    readable: HandleSet,
    writable: HandleSet,
    errored: HandleSet,
    deliveries: Vec<Delivery>,
    interrupted: bool,
}

impl MainloopContext {
    /// Create an empty context with an unbounded deadline
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&mut self, handle: Handle) {
        self.max_handle = Some(self.max_handle.map_or(handle, |max| max.max(handle)));
    }

    /// Wait for `handle` to become readable
    pub fn add_read(&mut self, handle: Handle) {
        self.read_interest.insert(handle);
        self.track(handle);
    }

    /// Wait for `handle` to become writable
    pub fn add_write(&mut self, handle: Handle) {
        self.write_interest.insert(handle);
        self.track(handle);
    }

    /// Wait for an exceptional condition on `handle`
    pub fn add_error(&mut self, handle: Handle) {
        self.error_interest.insert(handle);
        self.track(handle);
    }

    /// Handles with read interest
    pub fn read_interest(&self) -> &HandleSet {
        &self.read_interest
    }

    /// Handles with write interest
    pub fn write_interest(&self) -> &HandleSet {
        &self.write_interest
    }

    /// Handles with error interest
    pub fn error_interest(&self) -> &HandleSet {
        &self.error_interest
    }

    /// Highest handle contributed so far
    pub fn max_handle(&self) -> Option<Handle> {
        self.max_handle
    }

    /// Every handle with any interest, ascending
    pub fn interest_handles(&self) -> BTreeSet<Handle> {
        self.read_interest
            .iter()
            .chain(self.write_interest.iter())
            .chain(self.error_interest.iter())
            .collect()
    }

    /// Current deadline. `None` means wait forever.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Lower the deadline to `timeout` if it is sooner.
    ///
    /// The deadline never grows within an iteration.
    pub fn tighten_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(match self.timeout {
            Some(current) => current.min(timeout),
            None => timeout,
        });
    }

    /// Mark `handle` readable
    pub fn mark_readable(&mut self, handle: Handle) {
        self.readable.insert(handle);
    }

    /// Mark `handle` writable
    pub fn mark_writable(&mut self, handle: Handle) {
        self.writable.insert(handle);
    }

    /// Mark an exceptional condition on `handle`
    pub fn mark_error(&mut self, handle: Handle) {
        self.errored.insert(handle);
    }

    /// Whether the wait reported `handle` readable
    pub fn is_readable(&self, handle: Handle) -> bool {
        self.readable.contains(handle)
    }

    /// Whether the wait reported `handle` writable
    pub fn is_writable(&self, handle: Handle) -> bool {
        self.writable.contains(handle)
    }

    /// Whether the wait reported an exceptional condition on `handle`
    pub fn has_error(&self, handle: Handle) -> bool {
        self.errored.contains(handle)
    }

    /// Number of handles with any readiness
    pub fn ready_count(&self) -> usize {
        self.readable
            .iter()
            .chain(self.writable.iter())
            .chain(self.errored.iter())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Inject a frame for the process phase
    pub fn push_delivery(&mut self, delivery: Delivery) {
        self.deliveries.push(delivery);
    }

    /// Frames injected during the wait, in arrival order
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// Record that the wait was cut short by a signal
    pub fn mark_interrupted(&mut self) {
        self.interrupted = true;
    }

    /// Whether the wait was cut short by a signal
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Whether the wait produced nothing for the process phase
    pub fn is_idle(&self) -> bool {
        self.ready_count() == 0 && self.deliveries.is_empty()
    }
}
