//! Radio link under virtual time

use bytes::Bytes;
use tern_core::{DriverError, Handle, PlatformConfig};
use tern_drivers::FrameLink;

use crate::engine::SharedEngine;
use crate::event::MAX_EVENT_DATA_SIZE;

/// Publishes outbound spinel frames as simulation events.
///
/// Inbound frames arrive as context deliveries from the virtual-time wait,
/// so the link has no handle and never yields frames itself.
#[derive(Debug, Clone)]
pub struct VirtualFrameLink {
    engine: SharedEngine,
}

impl VirtualFrameLink {
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }
}

impl FrameLink for VirtualFrameLink {
    fn name(&self) -> &'static str {
        "virtual"
    }

    fn open(&mut self, _config: &PlatformConfig) -> Result<(), DriverError> {
        if self.engine.lock().is_initialized() {
            Ok(())
        } else {
            Err(DriverError::NotInitialized)
        }
    }

    fn close(&mut self) {}

    fn handle(&self) -> Option<Handle> {
        None
    }

    fn max_frame_size(&self) -> usize {
        MAX_EVENT_DATA_SIZE
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), DriverError> {
        self.engine.lock().send_radio_spinel_write_event(frame)?;
        Ok(())
    }

    fn recv_frame(&mut self) -> Result<Option<Bytes>, DriverError> {
        Ok(None)
    }
}
