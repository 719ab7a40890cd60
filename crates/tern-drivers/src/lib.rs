//! # Tern Drivers
//!
//! Reference drivers for the Tern mainloop.
//!
//! - [`AlarmDriver`]: bounds the wait by the nearest alarm and fires it
//! - [`RadioDriver`]: moves frames over a [`FrameLink`] to the radio
//! - [`UdpDriver`]: host UDP sockets for the protocol engine

pub mod alarm;
pub mod radio;
pub mod udp;

pub use alarm::AlarmDriver;
pub use radio::{FrameLink, MAX_FRAME_SIZE, RadioDriver, RadioStats, UnixFrameLink};
pub use udp::{UdpDriver, UdpStats};
