//! Clock sources
//!
//! The runtime reads time through the [`Clock`] trait so the same alarm and
//! mainloop logic runs against either a real monotonic clock or a virtual
//! clock driven by simulation events. The strategy is chosen once at startup
//! and injected into the [`AlarmService`](crate::alarm::AlarmService).
//!
//! All values are microseconds since the clock's origin.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use crate::error::AlarmError;

/// Microseconds per millisecond
pub const US_PER_MS: u64 = 1_000;

/// Microseconds per second
pub const US_PER_S: u64 = 1_000_000;

/// Time source abstraction
pub trait Clock: Debug + Send {
    /// Current time in microseconds
    fn now(&self) -> u64;

    /// Move the clock forward by `delta` microseconds, returning the new time.
    ///
    /// Only virtual clocks support this.
    fn advance(&mut self, delta: u64) -> Result<u64, AlarmError>;

    /// Convert a duration in clock time into the real time a wait should take
    fn scale_timeout(&self, timeout: Duration) -> Duration {
        timeout
    }

    /// Whether time only moves through [`advance`](Clock::advance)
    fn is_virtual(&self) -> bool;
}

/// Monotonic clock backed by [`Instant`], optionally sped up
#[derive(Debug, Clone)]
pub struct RealClock {
    origin: Instant,
    speed_up_factor: u32,
}

impl RealClock {
    /// Create a real clock running at wall-clock speed
    pub fn new() -> Self {
        Self::with_speed_up(1)
    }

    /// Create a real clock that runs `factor` times faster than wall time.
    ///
    /// A factor of zero is treated as one.
    pub fn with_speed_up(factor: u32) -> Self {
        Self {
            origin: Instant::now(),
            speed_up_factor: factor.max(1),
        }
    }

    /// Get the speed-up factor
    pub fn speed_up_factor(&self) -> u32 {
        self.speed_up_factor
    }
}

impl Default for RealClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RealClock {
    fn now(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX);
        elapsed.saturating_mul(u64::from(self.speed_up_factor))
    }

    fn advance(&mut self, _delta: u64) -> Result<u64, AlarmError> {
        Err(AlarmError::NotAdvanceable)
    }

    fn scale_timeout(&self, timeout: Duration) -> Duration {
        timeout / self.speed_up_factor
    }

    fn is_virtual(&self) -> bool {
        false
    }
}

/// Counter advanced only by consumed simulation events
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    now: u64,
}

impl VirtualClock {
    /// Create a virtual clock at time zero
    pub fn new() -> Self {
        Self { now: 0 }
    }

    /// Create a virtual clock at a given time
    pub fn starting_at(now: u64) -> Self {
        Self { now }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> u64 {
        self.now
    }

    fn advance(&mut self, delta: u64) -> Result<u64, AlarmError> {
        self.now = self
            .now
            .checked_add(delta)
            .ok_or(AlarmError::Overflow {
                now: self.now,
                delta,
            })?;
        Ok(self.now)
    }

    fn is_virtual(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_clock_is_monotonic() {
        let clock = RealClock::new();
        let a = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        let b = clock.now();
        assert!(b >= a + 1_000);
    }

    #[test]
    fn test_real_clock_cannot_advance() {
        let mut clock = RealClock::new();
        assert_eq!(clock.advance(10), Err(AlarmError::NotAdvanceable));
        assert!(!clock.is_virtual());
    }

    #[test]
    fn test_speed_up_scales_timeouts() {
        let clock = RealClock::with_speed_up(10);
        assert_eq!(
            clock.scale_timeout(Duration::from_millis(100)),
            Duration::from_millis(10)
        );

        let clock = RealClock::with_speed_up(0);
        assert_eq!(clock.speed_up_factor(), 1);
    }

    #[test]
    fn test_virtual_clock_advances_only_explicitly() {
        let mut clock = VirtualClock::new();
        assert_eq!(clock.now(), 0);
        std::thread::sleep(Duration::from_millis(1));
        assert_eq!(clock.now(), 0);

        assert_eq!(clock.advance(100), Ok(100));
        assert_eq!(clock.advance(0), Ok(100));
        assert_eq!(clock.now(), 100);
        assert!(clock.is_virtual());
    }

    #[test]
    fn test_virtual_clock_overflow_leaves_time_unchanged() {
        let mut clock = VirtualClock::starting_at(u64::MAX - 1);
        assert!(matches!(
            clock.advance(5),
            Err(AlarmError::Overflow { delta: 5, .. })
        ));
        assert_eq!(clock.now(), u64::MAX - 1);
    }
}
