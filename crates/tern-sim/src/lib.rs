//! # Tern Sim
//!
//! Virtual time for the Tern host runtime.
//!
//! Under virtual time a node never blocks on the wall clock. It tells a
//! simulation coordinator how long it would sleep and waits for the next
//! timed event instead. Many nodes can then run faster than real time, in
//! lockstep, on one machine.
//!
//! ## Key Types
//!
//! - [`VirtualTimeEvent`]: The fixed-layout wire record
//! - [`VirtualTimeEngine`]: Sends and receives events, advances the clock
//! - [`VirtualTimeWaiter`]: Mainloop waiter backed by the engine
//! - [`VirtualFrameLink`]: Radio link publishing spinel frames as events

pub mod channel;
pub mod engine;
pub mod error;
pub mod event;
pub mod link;
pub mod waiter;

pub use channel::{MemoryChannel, MemoryChannelHandle, SyncChannel, UdpSyncChannel};
pub use engine::{EngineStats, SharedEngine, VirtualTimeEngine};
pub use error::{SimError, SimResult};
pub use event::{EVENT_HEADER_LEN, EventKind, MAX_EVENT_DATA_SIZE, MAX_EVENT_SIZE, VirtualTimeEvent};
pub use link::VirtualFrameLink;
pub use waiter::VirtualTimeWaiter;
