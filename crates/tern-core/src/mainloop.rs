//! The host mainloop
//!
//! One iteration is four phases over a fresh [`MainloopContext`]:
//!
//! 1. reset the context
//! 2. every initialized driver contributes handles and a deadline
//! 3. the [`Waiter`] blocks once
//! 4. every initialized driver processes the result
//!
//! Drivers run in registration order in both phases. A driver whose
//! `process` fails is logged and reported, and the rest still run. Any wait
//! failure other than a signal interrupt ends the run.

use tracing::{debug, error, info, trace, warn};

use crate::alarm::AlarmService;
use crate::clock::Clock;
use crate::config::PlatformConfig;
use crate::context::MainloopContext;
use crate::driver::{ChangedFlags, Driver, DriverRegistry, DriverState, Host};
use crate::error::{MainloopError, WaitError};
use crate::instance::Instance;

/// The single blocking step of an iteration
pub trait Waiter: Send {
    /// Subsystem name used in fatal error reports
    fn name(&self) -> &'static str;

    /// Block until something in `ctx` is ready or its deadline passes, then
    /// record readiness in `ctx`.
    fn wait(&mut self, ctx: &mut MainloopContext, host: &mut Host<'_>) -> Result<(), WaitError>;
}

/// Outcome of one iteration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    /// Iteration number, starting at 1
    pub iteration: u64,
    /// Handles with any readiness after the wait
    pub ready: usize,
    /// Drivers that processed successfully
    pub processed: usize,
    /// Drivers whose process step failed
    pub failed: Vec<&'static str>,
    /// Whether a signal cut the wait short
    pub interrupted: bool,
}

/// The mainloop: driver registry, alarm service and waiter
pub struct Mainloop {
    drivers: DriverRegistry,
    alarms: AlarmService,
    waiter: Box<dyn Waiter>,
    iteration: u64,
}

impl Mainloop {
    /// Create a mainloop over the given clock and waiter
    pub fn new(clock: Box<dyn Clock>, waiter: Box<dyn Waiter>) -> Self {
        Self {
            drivers: DriverRegistry::new(),
            alarms: AlarmService::new(clock),
            waiter,
            iteration: 0,
        }
    }

    /// Append a driver. Drivers run in the order they are registered.
    pub fn register(&mut self, driver: Box<dyn Driver>) -> Result<(), MainloopError> {
        let name = driver.name();
        let kind = driver.kind();
        self.drivers.register(driver)?;
        debug!(driver = name, %kind, "Driver registered");
        Ok(())
    }

    /// Remove a driver by name
    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn Driver>> {
        let removed = self.drivers.unregister(name);
        if removed.is_some() {
            debug!(driver = name, "Driver unregistered");
        }
        removed
    }

    /// Lifecycle state of a driver
    pub fn driver_state(&self, name: &str) -> Option<DriverState> {
        self.drivers.state(name)
    }

    /// Registered driver names, in order
    pub fn driver_names(&self) -> Vec<&'static str> {
        self.drivers.names()
    }

    /// Initialize every driver not yet initialized.
    ///
    /// Stops at the first failure. The failing driver and every driver
    /// already initialized are deinitialized before the error is returned.
    pub fn init_drivers(&mut self, config: &PlatformConfig) -> Result<(), MainloopError> {
        let slots = self.drivers.slots_mut();

        for index in 0..slots.len() {
            if slots[index].state == DriverState::Initialized {
                continue;
            }

            let name = slots[index].driver.name();
            match slots[index].driver.init(config) {
                Ok(()) => {
                    slots[index].state = DriverState::Initialized;
                    debug!(driver = name, "Driver initialized");
                }
                Err(source) => {
                    error!(driver = name, error = %source, "Driver initialization failed");
                    slots[index].driver.deinit();
                    slots[index].state = DriverState::Deinitialized;

                    for slot in slots[..index].iter_mut().rev() {
                        if slot.state == DriverState::Initialized {
                            slot.driver.deinit();
                            slot.state = DriverState::Deinitialized;
                        }
                    }
                    return Err(MainloopError::DriverInit {
                        driver: name,
                        source,
                    });
                }
            }
        }

        info!(drivers = slots.len(), "Mainloop drivers initialized");
        Ok(())
    }

    /// Deinitialize every initialized driver, in reverse order
    pub fn deinit(&mut self) {
        for slot in self.drivers.slots_mut().iter_mut().rev() {
            if slot.state == DriverState::Initialized {
                slot.driver.deinit();
                slot.state = DriverState::Deinitialized;
                debug!(driver = slot.driver.name(), "Driver deinitialized");
            }
        }
    }

    /// Forward a protocol state change to every initialized driver
    pub fn notify_state_change(&mut self, flags: ChangedFlags) {
        trace!(?flags, "State change");
        for slot in self.drivers.slots_mut() {
            if slot.state == DriverState::Initialized {
                slot.driver.on_state_change(flags);
            }
        }
    }

    /// Run one contribute / wait / process cycle
    pub fn run_iteration(
        &mut self,
        instance: &mut dyn Instance,
    ) -> Result<IterationReport, MainloopError> {
        self.iteration += 1;
        let mut report = IterationReport {
            iteration: self.iteration,
            ..Default::default()
        };

        let mut ctx = MainloopContext::new();

        for slot in self.drivers.slots_mut() {
            if slot.state == DriverState::Initialized {
                slot.driver.update(&mut ctx, &self.alarms);
            }
        }

        trace!(
            iteration = self.iteration,
            handles = ctx.interest_handles().len(),
            timeout = ?ctx.timeout(),
            "Waiting"
        );

        let mut host = Host::new(&mut self.alarms, instance);
        match self.waiter.wait(&mut ctx, &mut host) {
            Ok(()) => {}
            Err(WaitError::Interrupted) => {
                trace!(iteration = self.iteration, "Wait interrupted");
                ctx.mark_interrupted();
            }
            Err(source) => {
                let subsystem = self.waiter.name();
                error!(subsystem, error = %source, "Wait failed");
                return Err(MainloopError::Wait { subsystem, source });
            }
        }

        report.ready = ctx.ready_count();
        report.interrupted = ctx.was_interrupted();

        for slot in self.drivers.slots_mut() {
            if slot.state != DriverState::Initialized {
                continue;
            }
            match slot.driver.process(&ctx, &mut host) {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    warn!(driver = slot.driver.name(), error = %e, "Driver process failed");
                    report.failed.push(slot.driver.name());
                }
            }
        }

        Ok(report)
    }

    /// Run iterations until `done` returns true after one of them
    pub fn run_until<F>(
        &mut self,
        instance: &mut dyn Instance,
        mut done: F,
    ) -> Result<u64, MainloopError>
    where
        F: FnMut(&IterationReport, &AlarmService) -> bool,
    {
        let mut count = 0;
        loop {
            let report = self.run_iteration(instance)?;
            count += 1;
            if done(&report, &self.alarms) {
                return Ok(count);
            }
        }
    }

    /// The alarm service
    pub fn alarms(&self) -> &AlarmService {
        &self.alarms
    }

    /// The alarm service, for scheduling from outside an iteration
    pub fn alarms_mut(&mut self) -> &mut AlarmService {
        &mut self.alarms
    }

    /// Iterations run so far
    pub fn iterations(&self) -> u64 {
        self.iteration
    }
}

impl std::fmt::Debug for Mainloop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mainloop")
            .field("drivers", &self.drivers)
            .field("alarms", &self.alarms)
            .field("waiter", &self.waiter.name())
            .field("iteration", &self.iteration)
            .finish()
    }
}
