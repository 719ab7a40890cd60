//! Driver capability contract and registry
//!
//! Every platform subsystem (alarm, radio, UDP, network interface, ...)
//! plugs into the mainloop through the [`Driver`] trait. Drivers never
//! reference each other. They only see the shared [`MainloopContext`] and
//! the [`Host`] handed to them during processing.

use std::fmt;
use std::ops::BitOr;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::alarm::AlarmService;
use crate::config::PlatformConfig;
use crate::context::MainloopContext;
use crate::error::{DriverError, MainloopError};
use crate::instance::Instance;

/// Kind of subsystem a driver provides, for diagnostics
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverKind {
    #[display("alarm")]
    Alarm,
    #[display("radio")]
    Radio,
    #[display("netif")]
    Netif,
    #[display("udp")]
    Udp,
    #[display("trel")]
    Trel,
    #[display("backbone")]
    Backbone,
    #[display("infra-if")]
    InfraIf,
    #[display("daemon")]
    Daemon,
    #[display("custom")]
    Custom,
}

/// Lifecycle state tracked by the registry
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverState {
    #[default]
    Uninitialized,
    Initialized,
    Deinitialized,
}

/// Protocol engine state-change flags
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChangedFlags(u32);

impl ChangedFlags {
    pub const NONE: ChangedFlags = ChangedFlags(0);
    pub const IP6_ADDRESS_ADDED: ChangedFlags = ChangedFlags(1 << 0);
    pub const IP6_ADDRESS_REMOVED: ChangedFlags = ChangedFlags(1 << 1);
    pub const ROLE: ChangedFlags = ChangedFlags(1 << 2);
    pub const LINK_LOCAL_ADDRESS: ChangedFlags = ChangedFlags(1 << 3);
    pub const IP6_MULTICAST_SUBSCRIBED: ChangedFlags = ChangedFlags(1 << 4);
    pub const IP6_MULTICAST_UNSUBSCRIBED: ChangedFlags = ChangedFlags(1 << 5);
    pub const CHANNEL: ChangedFlags = ChangedFlags(1 << 12);
    pub const PAN_ID: ChangedFlags = ChangedFlags(1 << 13);
    pub const NETWORK_NAME: ChangedFlags = ChangedFlags(1 << 14);
    pub const EXTENDED_PAN_ID: ChangedFlags = ChangedFlags(1 << 15);
    pub const THREAD_NETIF_STATE: ChangedFlags = ChangedFlags(1 << 24);

    /// Build from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        ChangedFlags(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every flag in `other` is set
    pub const fn contains(self, other: ChangedFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flag is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ChangedFlags {
    type Output = ChangedFlags;

    fn bitor(self, rhs: ChangedFlags) -> ChangedFlags {
        ChangedFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for ChangedFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangedFlags({:#010x})", self.0)
    }
}

/// What a driver may touch while processing
pub struct Host<'a> {
    /// Alarm service, for drivers that fire or schedule alarms
    pub alarms: &'a mut AlarmService,
    /// Protocol engine
    pub instance: &'a mut dyn Instance,
}

impl<'a> Host<'a> {
    pub fn new(alarms: &'a mut AlarmService, instance: &'a mut dyn Instance) -> Self {
        Self { alarms, instance }
    }
}

/// A platform subsystem driven by the mainloop
pub trait Driver: Send {
    /// Stable name used in logs and error reports
    fn name(&self) -> &'static str;

    /// Subsystem kind
    fn kind(&self) -> DriverKind;

    /// Acquire resources.
    ///
    /// On failure nothing acquired here may stay held.
    fn init(&mut self, config: &PlatformConfig) -> Result<(), DriverError>;

    /// Release resources. Safe to call more than once and after a failed init.
    fn deinit(&mut self);

    /// Contribute handles and deadline for the coming wait. Must not block.
    fn update(&mut self, ctx: &mut MainloopContext, alarms: &AlarmService);

    /// Act on the readiness the wait produced.
    ///
    /// Must be a no-op when nothing this driver contributed is ready.
    fn process(&mut self, ctx: &MainloopContext, host: &mut Host<'_>) -> Result<(), DriverError>;

    /// The protocol engine changed state
    fn on_state_change(&mut self, _flags: ChangedFlags) {}
}

pub(crate) struct DriverSlot {
    pub(crate) driver: Box<dyn Driver>,
    pub(crate) state: DriverState,
}

/// Ordered set of drivers with their lifecycle state
#[derive(Default)]
pub struct DriverRegistry {
    slots: Vec<DriverSlot>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a driver. Names must be unique.
    pub fn register(&mut self, driver: Box<dyn Driver>) -> Result<(), MainloopError> {
        let name = driver.name();
        if self.slots.iter().any(|slot| slot.driver.name() == name) {
            return Err(MainloopError::DuplicateDriver(name));
        }
        self.slots.push(DriverSlot {
            driver,
            state: DriverState::Uninitialized,
        });
        Ok(())
    }

    /// Remove a driver by name, deinitializing it if needed
    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn Driver>> {
        let index = self.slots.iter().position(|slot| slot.driver.name() == name)?;
        let mut slot = self.slots.remove(index);
        if slot.state == DriverState::Initialized {
            slot.driver.deinit();
        }
        Some(slot.driver)
    }

    /// Lifecycle state of a driver
    pub fn state(&self, name: &str) -> Option<DriverState> {
        self.slots
            .iter()
            .find(|slot| slot.driver.name() == name)
            .map(|slot| slot.state)
    }

    /// Driver names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|slot| slot.driver.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [DriverSlot] {
        &mut self.slots
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.slots.iter().map(|slot| (slot.driver.name(), slot.state)))
            .finish()
    }
}
