//! # Tern Platform
//!
//! Puts the pieces together: a [`Platform`] owns a mainloop with the alarm,
//! radio and UDP drivers, running on either the wall clock or a simulation
//! coordinator's virtual clock.
//!
//! ```ignore
//! use tern_core::PlatformConfig;
//! use tern_platform::Platform;
//!
//! let mut platform = Platform::new(PlatformConfig::simulation(1))?;
//! platform.init()?;
//! loop {
//!     platform.run_iteration(&mut stack)?;
//! }
//! ```

pub mod error;
pub mod platform;

pub use error::{PlatformError, PlatformResult};
pub use platform::Platform;
