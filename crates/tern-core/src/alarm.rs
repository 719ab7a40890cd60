//! # Alarm Service
//!
//! Tracks the next wake-up instant the protocol engine asked for, in each
//! clock domain, and fires it exactly once.
//!
//! Two domains coexist: a millisecond alarm and a microsecond alarm. Each
//! holds at most one live deadline. Fire times are given in the domain's own
//! units and stored internally in microseconds, so the same comparison works
//! for both.
//!
//! ```text
//! set_alarm ──► armed ──(deadline crossed)──► fire_due ──► disarmed
//!                 │                                           ▲
//!                 └──────────────── cancel ───────────────────┘
//! ```

use std::time::Duration;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::clock::{Clock, US_PER_MS};
use crate::error::AlarmError;
use crate::instance::Instance;

/// Alarm resolution domain
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlarmDomain {
    /// Millisecond alarm
    #[display("milli")]
    Milli,
    /// Microsecond alarm
    #[display("micro")]
    Micro,
}

impl AlarmDomain {
    /// All domains, in firing order
    pub const ALL: [AlarmDomain; 2] = [AlarmDomain::Milli, AlarmDomain::Micro];

    /// Microseconds per unit of this domain
    pub fn unit_micros(self) -> u64 {
        match self {
            AlarmDomain::Milli => US_PER_MS,
            AlarmDomain::Micro => 1,
        }
    }

    fn index(self) -> usize {
        match self {
            AlarmDomain::Milli => 0,
            AlarmDomain::Micro => 1,
        }
    }
}

/// Armed state of one alarm domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlarmState {
    /// Absolute fire time in microseconds
    fire_at: u64,
    armed: bool,
}

impl AlarmState {
    /// Whether a deadline is live
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Absolute fire time in microseconds, if armed
    pub fn fire_at(&self) -> Option<u64> {
        self.armed.then_some(self.fire_at)
    }
}

/// The alarm service.
///
/// Owns the clock strategy. The protocol engine schedules through
/// [`set_alarm`](Self::set_alarm) / [`cancel`](Self::cancel) and reads time
/// through [`now_micros`](Self::now_micros) / [`now_millis`](Self::now_millis).
#[derive(Debug)]
pub struct AlarmService {
    clock: Box<dyn Clock>,
    alarms: [AlarmState; 2],
    fired: u64,
}

impl AlarmService {
    /// Create an alarm service over the given clock
    pub fn new(clock: Box<dyn Clock>) -> Self {
        debug!(virtual_time = clock.is_virtual(), "Alarm service initialized");
        Self {
            clock,
            alarms: [AlarmState::default(); 2],
            fired: 0,
        }
    }

    /// Current time in microseconds
    pub fn now_micros(&self) -> u64 {
        self.clock.now()
    }

    /// Current time in milliseconds
    pub fn now_millis(&self) -> u64 {
        self.clock.now() / US_PER_MS
    }

    /// Current time in the units of `domain`
    pub fn now_in(&self, domain: AlarmDomain) -> u64 {
        self.clock.now() / domain.unit_micros()
    }

    /// Access the clock strategy
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Whether the active clock is virtual
    pub fn is_virtual(&self) -> bool {
        self.clock.is_virtual()
    }

    /// Arm `domain` to fire at `fire_time`, in the domain's units.
    ///
    /// Replaces any deadline already armed in that domain.
    pub fn set_alarm(&mut self, domain: AlarmDomain, fire_time: u64) {
        let fire_at = fire_time.saturating_mul(domain.unit_micros());
        self.alarms[domain.index()] = AlarmState {
            fire_at,
            armed: true,
        };
        trace!(%domain, fire_at, "Alarm armed");
    }

    /// Arm `domain` to fire `dt` units after `t0`
    pub fn start_at(&mut self, domain: AlarmDomain, t0: u64, dt: u64) {
        self.set_alarm(domain, t0.saturating_add(dt));
    }

    /// Disarm `domain`
    pub fn cancel(&mut self, domain: AlarmDomain) {
        if self.alarms[domain.index()].armed {
            trace!(%domain, "Alarm cancelled");
        }
        self.alarms[domain.index()].armed = false;
    }

    /// Get the state of `domain`
    pub fn state(&self, domain: AlarmDomain) -> AlarmState {
        self.alarms[domain.index()]
    }

    /// Whether `domain` has a live deadline
    pub fn is_armed(&self, domain: AlarmDomain) -> bool {
        self.alarms[domain.index()].armed
    }

    /// Time left until `domain` fires, in clock time.
    ///
    /// Returns `None` when nothing is armed and zero when the deadline has
    /// already passed.
    pub fn remaining(&self, domain: AlarmDomain) -> Option<Duration> {
        let state = self.alarms[domain.index()];
        if !state.armed {
            return None;
        }
        let now = self.clock.now();
        Some(Duration::from_micros(state.fire_at.saturating_sub(now)))
    }

    /// Time left until the nearest armed domain fires
    pub fn next_remaining(&self) -> Option<Duration> {
        AlarmDomain::ALL
            .iter()
            .filter_map(|domain| self.remaining(*domain))
            .min()
    }

    /// Number of alarms fired since creation
    pub fn fired_count(&self) -> u64 {
        self.fired
    }

    /// Fire every armed deadline that has been reached, earliest first.
    ///
    /// Each domain is disarmed before the engine is told, so a deadline is
    /// delivered exactly once. An alarm re-armed from inside the callback
    /// waits for the next call, even if it is already due.
    pub fn fire_due(&mut self, instance: &mut dyn Instance) -> usize {
        let now = self.clock.now();
        let mut due: Vec<(u64, AlarmDomain)> = AlarmDomain::ALL
            .into_iter()
            .filter_map(|domain| {
                let state = self.alarms[domain.index()];
                (state.armed && state.fire_at <= now).then_some((state.fire_at, domain))
            })
            .collect();
        due.sort_by_key(|&(fire_at, _)| fire_at);

        let mut fired = 0;
        for (fire_at, domain) in due {
            let state = &mut self.alarms[domain.index()];
            // Cancelled or re-armed by an earlier callback in this pass.
            if !state.armed || state.fire_at != fire_at {
                continue;
            }
            state.armed = false;
            fired += 1;
            self.fired += 1;
            debug!(%domain, now, late_us = now - fire_at, "Alarm fired");
            instance.alarm_fired(domain, self);
        }

        fired
    }

    /// Advance a virtual clock by `delta` microseconds and fire every
    /// deadline inside `[previous, previous + delta]`.
    ///
    /// On error the clock is left unchanged and nothing fires.
    pub fn advance_now(
        &mut self,
        delta: u64,
        instance: &mut dyn Instance,
    ) -> Result<usize, AlarmError> {
        let previous = self.clock.now();
        let now = self.clock.advance(delta)?;
        trace!(previous, now, "Clock advanced");
        Ok(self.fire_due(instance))
    }
}
