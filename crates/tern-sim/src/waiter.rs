//! Mainloop waiter for virtual time

use std::time::Duration;

use tern_core::{Host, MainloopContext, WaitError, Waiter, poll_context};
use tracing::trace;

use crate::engine::SharedEngine;

/// Waits by exchanging events with the simulation coordinator.
///
/// Local handles are polled without blocking first. Only when none is ready
/// does the node announce its sleep and block on the coordinator.
#[derive(Debug, Clone)]
pub struct VirtualTimeWaiter {
    engine: SharedEngine,
}

impl VirtualTimeWaiter {
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }
}

impl Waiter for VirtualTimeWaiter {
    fn name(&self) -> &'static str {
        "virtual-time"
    }

    fn wait(&mut self, ctx: &mut MainloopContext, host: &mut Host<'_>) -> Result<(), WaitError> {
        if !ctx.interest_handles().is_empty() && poll_context(ctx, Some(Duration::ZERO))? > 0 {
            trace!("Local handles ready, skipping sleep");
            return Ok(());
        }

        let mut engine = self.engine.lock();
        engine.send_sleep_event(ctx.timeout())?;
        let event = engine.receive_event()?;
        engine.dispatch(event, ctx, host)?;
        Ok(())
    }
}
