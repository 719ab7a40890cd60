//! # Tern Core
//!
//! Core traits and types for the Tern host runtime.
//!
//! The runtime hosts a low-power mesh protocol engine on a POSIX system. A
//! single-threaded mainloop gathers handles and deadlines from pluggable
//! drivers, blocks once, then lets each driver act on what became ready.
//! Time is read through a [`Clock`], so the same loop runs against the wall
//! clock or a simulation-driven virtual clock.
//!
//! ## Key Traits
//!
//! - [`Driver`]: A platform subsystem (alarm, radio, UDP, ...)
//! - [`Waiter`]: The single blocking step of an iteration
//! - [`Clock`]: Real or virtual time source
//! - [`Instance`]: The protocol engine boundary
//!
//! ## Key Types
//!
//! - [`Mainloop`]: Driver registry plus the contribute / wait / process cycle
//! - [`MainloopContext`]: Per-iteration handles, deadline and readiness
//! - [`AlarmService`]: Millisecond and microsecond one-shot alarms
//! - [`PlatformConfig`]: Interface names, radio URL, time mode

pub mod alarm;
pub mod clock;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod instance;
pub mod mainloop;
pub mod poll;
pub mod text;

// Re-export main types
pub use alarm::{AlarmDomain, AlarmService, AlarmState};
pub use clock::{Clock, RealClock, US_PER_MS, US_PER_S, VirtualClock};
pub use config::{PlatformConfig, RadioUrl, TimeMode, VirtualTimeConfig};
pub use context::{Delivery, Handle, HandleSet, MainloopContext};
pub use driver::{ChangedFlags, Driver, DriverKind, DriverRegistry, DriverState, Host};
pub use error::*;
pub use instance::{Instance, UdpDatagram};
pub use mainloop::{IterationReport, Mainloop, Waiter};
pub use poll::{PollWaiter, poll_context};
pub use text::{InterfaceName, StringWriter};
