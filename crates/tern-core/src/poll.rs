//! Readiness wait over the contributed handles, using `poll(2)`

use std::os::fd::BorrowedFd;
use std::time::Duration;

use rustix::event::{PollFd, PollFlags, poll};
use rustix::io::Errno;
use tracing::trace;

use crate::context::{Handle, MainloopContext};
use crate::driver::Host;
use crate::error::WaitError;
use crate::mainloop::Waiter;

/// Convert a deadline into a `poll(2)` timeout in milliseconds.
///
/// Rounds up so a pending alarm is never woken early. `None` blocks forever.
pub fn timeout_millis(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(timeout) => {
            let micros = timeout.as_micros();
            let millis = micros.div_ceil(1_000);
            i32::try_from(millis).unwrap_or(i32::MAX)
        }
    }
}

/// Poll every handle in `ctx` once, bounded by `timeout`, and record the
/// readiness back into `ctx`.
///
/// Returns the number of handles with any readiness.
pub fn poll_context(
    ctx: &mut MainloopContext,
    timeout: Option<Duration>,
) -> Result<usize, WaitError> {
    let handles: Vec<Handle> = ctx.interest_handles().into_iter().collect();

    let mut fds: Vec<PollFd<'_>> = handles
        .iter()
        .map(|&handle| {
            let mut flags = PollFlags::empty();
            if ctx.read_interest().contains(handle) {
                flags |= PollFlags::IN;
            }
            if ctx.write_interest().contains(handle) {
                flags |= PollFlags::OUT;
            }
            if ctx.error_interest().contains(handle) {
                flags |= PollFlags::PRI;
            }
            // SAFETY: drivers only contribute handles they own, and they keep
            // them open until after the process phase of this iteration.
            let fd = unsafe { BorrowedFd::borrow_raw(handle) };
            PollFd::from_borrowed_fd(fd, flags)
        })
        .collect();

    let ready = match poll(&mut fds, timeout_millis(timeout)) {
        Ok(ready) => ready,
        Err(e) if e == Errno::INTR => return Err(WaitError::Interrupted),
        Err(e) => return Err(WaitError::Io(e.into())),
    };

    let revents: Vec<(Handle, PollFlags)> = handles
        .iter()
        .zip(fds.iter())
        .map(|(&handle, fd)| (handle, fd.revents()))
        .collect();
    drop(fds);

    for (handle, revents) in revents {
        if revents.is_empty() {
            continue;
        }
        if ctx.read_interest().contains(handle)
            && revents.intersects(PollFlags::IN | PollFlags::HUP | PollFlags::ERR)
        {
            ctx.mark_readable(handle);
        }
        if revents.contains(PollFlags::OUT) {
            ctx.mark_writable(handle);
        }
        if ctx.error_interest().contains(handle)
            && revents.intersects(PollFlags::PRI | PollFlags::ERR | PollFlags::NVAL)
        {
            ctx.mark_error(handle);
        }
    }

    trace!(handles = handles.len(), ready, "Poll returned");
    Ok(ready)
}

/// Waiter that blocks in `poll(2)` until a handle is ready or the deadline
/// passes
#[derive(Debug, Default)]
pub struct PollWaiter;

impl PollWaiter {
    pub fn new() -> Self {
        Self
    }
}

impl Waiter for PollWaiter {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn wait(&mut self, ctx: &mut MainloopContext, _host: &mut Host<'_>) -> Result<(), WaitError> {
        let timeout = ctx.timeout();
        poll_context(ctx, timeout)?;
        Ok(())
    }
}
