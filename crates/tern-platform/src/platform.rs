//! Platform assembly
//!
//! The clock, the waiter and the radio link are chosen once, from the
//! configured time mode. Drivers are registered in a fixed order: alarm,
//! radio, UDP.

use tern_core::{
    AlarmService, ChangedFlags, Clock, Driver, DriverState, Instance, IterationReport, Mainloop,
    PlatformConfig, PollWaiter, RealClock, TimeMode, VirtualClock, Waiter,
};
use tern_drivers::{AlarmDriver, FrameLink, RadioDriver, UdpDriver, UnixFrameLink};
use tern_logging::NodeContextGuard;
use tern_sim::{SharedEngine, VirtualFrameLink, VirtualTimeEngine, VirtualTimeWaiter};
use tracing::{Span, debug, info, warn};

use crate::error::{PlatformError, PlatformResult};

/// A host platform instance driving one protocol stack
pub struct Platform {
    config: PlatformConfig,
    mainloop: Mainloop,
    engine: Option<SharedEngine>,
    span: Span,
    started: bool,
}

impl Platform {
    /// Build a platform from `config`.
    ///
    /// Under virtual time the engine binds its UDP channel during [`init`].
    ///
    /// [`init`]: Platform::init
    pub fn new(config: PlatformConfig) -> PlatformResult<Self> {
        let engine = match &config.time_mode {
            TimeMode::Virtual(vt) => Some(VirtualTimeEngine::new(vt.clone()).into_shared()),
            TimeMode::Real => None,
        };
        Self::assemble(config, engine)
    }

    /// Build a virtual-time platform around an existing engine.
    ///
    /// An engine with a channel already attached skips the UDP bind.
    pub fn with_engine(config: PlatformConfig, engine: VirtualTimeEngine) -> PlatformResult<Self> {
        if !config.is_virtual() {
            return Err(PlatformError::Driver(tern_core::DriverError::InvalidConfig(
                "an engine requires virtual time mode".to_string(),
            )));
        }
        Self::assemble(config, Some(engine.into_shared()))
    }

    fn assemble(config: PlatformConfig, engine: Option<SharedEngine>) -> PlatformResult<Self> {
        config.validate()?;

        let span = {
            let _ctx = NodeContextGuard::for_config(&config);
            NodeContextGuard::span()
        };

        let (clock, waiter): (Box<dyn Clock>, Box<dyn Waiter>) = match &engine {
            Some(engine) => (
                Box::new(VirtualClock::new()),
                Box::new(VirtualTimeWaiter::new(engine.clone())),
            ),
            None => (
                Box::new(RealClock::with_speed_up(config.speed_up_factor)),
                Box::new(PollWaiter::new()),
            ),
        };

        let link: Option<Box<dyn FrameLink>> = match (&engine, &config.radio_url) {
            (Some(engine), _) => Some(Box::new(VirtualFrameLink::new(engine.clone()))),
            (None, Some(url)) => Some(Box::new(UnixFrameLink::from_url(url)?)),
            (None, None) => None,
        };

        let mut mainloop = Mainloop::new(clock, waiter);
        mainloop.register(Box::new(AlarmDriver::new()))?;
        if let Some(link) = link {
            mainloop.register(Box::new(RadioDriver::new(link)))?;
        }
        mainloop.register(Box::new(UdpDriver::new()))?;

        span.in_scope(|| {
            debug!(
                interface = %config.interface_name,
                drivers = ?mainloop.driver_names(),
                virtual_time = config.is_virtual(),
                "Platform assembled"
            );
        });

        Ok(Self {
            config,
            mainloop,
            engine,
            span,
            started: false,
        })
    }

    /// Initialize the engine, then every driver.
    ///
    /// Calling this on a started platform does nothing.
    pub fn init(&mut self) -> PlatformResult<()> {
        if self.started {
            return Ok(());
        }
        let _entered = self.span.enter();

        if let Some(engine) = &self.engine {
            engine.lock().init()?;
        }
        if let Err(e) = self.mainloop.init_drivers(&self.config) {
            if let Some(engine) = &self.engine {
                engine.lock().deinit();
            }
            return Err(e.into());
        }

        self.started = true;
        info!(interface = %self.config.interface_name, "Platform started");
        Ok(())
    }

    /// Run one mainloop iteration
    pub fn run_iteration(
        &mut self,
        instance: &mut dyn Instance,
    ) -> PlatformResult<IterationReport> {
        if !self.started {
            return Err(PlatformError::NotStarted);
        }
        let _entered = self.span.enter();
        let report = self.mainloop.run_iteration(instance)?;
        if !report.failed.is_empty() {
            warn!(iteration = report.iteration, failed = ?report.failed, "Drivers failed");
        }
        Ok(report)
    }

    /// Run iterations until `done` returns true
    pub fn run_until<F>(&mut self, instance: &mut dyn Instance, done: F) -> PlatformResult<u64>
    where
        F: FnMut(&IterationReport, &AlarmService) -> bool,
    {
        if !self.started {
            return Err(PlatformError::NotStarted);
        }
        let _entered = self.span.enter();
        Ok(self.mainloop.run_until(instance, done)?)
    }

    /// Forward a protocol state change to the drivers
    pub fn notify_state_change(&mut self, flags: ChangedFlags) {
        let _entered = self.span.enter();
        self.mainloop.notify_state_change(flags);
    }

    /// Deinitialize drivers in reverse order, then close the engine
    pub fn deinit(&mut self) {
        if !self.started {
            return;
        }
        let _entered = self.span.enter();
        self.mainloop.deinit();
        if let Some(engine) = &self.engine {
            engine.lock().deinit();
        }
        self.started = false;
        info!("Platform stopped");
    }

    pub fn alarms(&self) -> &AlarmService {
        self.mainloop.alarms()
    }

    pub fn alarms_mut(&mut self) -> &mut AlarmService {
        self.mainloop.alarms_mut()
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// The virtual time engine, if running under virtual time
    pub fn engine(&self) -> Option<&SharedEngine> {
        self.engine.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn driver_names(&self) -> Vec<&'static str> {
        self.mainloop.driver_names()
    }

    pub fn driver_state(&self, name: &str) -> Option<DriverState> {
        self.mainloop.driver_state(name)
    }

    /// Add a driver after the built-in ones. Only allowed before [`init`].
    ///
    /// [`init`]: Platform::init
    pub fn register(&mut self, driver: Box<dyn Driver>) -> PlatformResult<()> {
        self.mainloop.register(driver)?;
        Ok(())
    }

    pub fn iterations(&self) -> u64 {
        self.mainloop.iterations()
    }
}

impl Drop for Platform {
    fn drop(&mut self) {
        self.deinit();
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("interface", &self.config.interface_name)
            .field("drivers", &self.mainloop.driver_names())
            .field("virtual_time", &self.engine.is_some())
            .field("started", &self.started)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use tern_sim::MemoryChannel;

    use super::*;

    #[test]
    fn test_real_platform_without_radio() {
        let platform = Platform::new(PlatformConfig::default()).unwrap();
        assert_eq!(platform.driver_names(), vec!["alarm", "udp"]);
        assert!(!platform.alarms().is_virtual());
        assert!(platform.engine().is_none());
    }

    #[test]
    fn test_virtual_platform_uses_virtual_link() {
        let platform = Platform::new(PlatformConfig::simulation(2)).unwrap();
        assert_eq!(platform.driver_names(), vec!["alarm", "radio", "udp"]);
        assert!(platform.alarms().is_virtual());
        assert!(platform.engine().is_some());
    }

    #[test]
    fn test_non_unix_radio_url_rejected() {
        let url = tern_core::RadioUrl::parse("spinel+hdlc+uart:///dev/ttyUSB0").unwrap();
        let err = Platform::new(PlatformConfig::default().with_radio_url(url)).unwrap_err();
        assert!(matches!(err, PlatformError::Driver(_)));
    }

    #[test]
    fn test_engine_requires_virtual_mode() {
        let engine = VirtualTimeEngine::new(tern_core::VirtualTimeConfig::new(1));
        assert!(Platform::with_engine(PlatformConfig::default(), engine).is_err());
    }

    #[test]
    fn test_iteration_before_init() {
        struct Idle;
        impl Instance for Idle {
            fn alarm_fired(&mut self, _: tern_core::AlarmDomain, _: &mut AlarmService) {}
        }

        let mut platform = Platform::new(PlatformConfig::default()).unwrap();
        let err = platform.run_iteration(&mut Idle).unwrap_err();
        assert!(matches!(err, PlatformError::NotStarted));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_init_deinit_cycle() {
        let (channel, _handle) = MemoryChannel::new();
        let mut engine = VirtualTimeEngine::new(tern_core::VirtualTimeConfig::new(1));
        engine.attach(Box::new(channel));
        let mut platform = Platform::with_engine(PlatformConfig::simulation(1), engine).unwrap();

        platform.init().unwrap();
        platform.init().unwrap();
        assert!(platform.is_started());
        assert_eq!(platform.driver_state("radio"), Some(DriverState::Initialized));

        platform.deinit();
        assert!(!platform.is_started());
        assert_eq!(platform.driver_state("radio"), Some(DriverState::Deinitialized));
        assert!(!platform.engine().unwrap().lock().is_initialized());
    }
}
