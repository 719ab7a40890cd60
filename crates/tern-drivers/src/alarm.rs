//! Alarm driver
//!
//! Bounds the wait by the nearest armed alarm and fires due alarms once the
//! wait returns. Under a sped-up real clock the contributed wait is divided
//! by the speed-up factor.

use tern_core::{
    AlarmService, Driver, DriverError, DriverKind, Host, MainloopContext, PlatformConfig,
};
use tracing::trace;

/// Driver that ties the alarm service into the mainloop
#[derive(Debug, Default)]
pub struct AlarmDriver {
    initialized: bool,
    fired: u64,
}

impl AlarmDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alarms fired from this driver's process step
    pub fn fired(&self) -> u64 {
        self.fired
    }
}

impl Driver for AlarmDriver {
    fn name(&self) -> &'static str {
        "alarm"
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Alarm
    }

    fn init(&mut self, _config: &PlatformConfig) -> Result<(), DriverError> {
        self.initialized = true;
        Ok(())
    }

    fn deinit(&mut self) {
        self.initialized = false;
    }

    fn update(&mut self, ctx: &mut MainloopContext, alarms: &AlarmService) {
        if let Some(remaining) = alarms.next_remaining() {
            let timeout = alarms.clock().scale_timeout(remaining);
            trace!(?remaining, ?timeout, "Alarm deadline");
            ctx.tighten_timeout(timeout);
        }
    }

    fn process(&mut self, _ctx: &MainloopContext, host: &mut Host<'_>) -> Result<(), DriverError> {
        if !self.initialized {
            return Err(DriverError::NotInitialized);
        }
        let fired = host.alarms.fire_due(&mut *host.instance);
        self.fired += fired as u64;
        Ok(())
    }
}
