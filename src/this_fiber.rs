//! Operations on the calling fiber.
//!
//! These free functions act on whatever fiber is executing the call. On a
//! scheduler's main context they degrade gracefully: `yield_now` pumps the
//! run loop once, sleeps pump it until the deadline, and interruption
//! operations are no-ops (the main context cannot be interrupted).

use crate::clock;
use crate::context::Wake;
use crate::error::Result;
use crate::runtime::{current, CurrentHandle, SchedulerCore};
use crate::types::{FiberId, InterruptMode, Time};
use std::marker::PhantomData;
use std::panic::panic_any;
use std::sync::Arc;
use std::time::Duration;

/// Clean-exit payload thrown by [`yield_break`] and caught by the spawn
/// trampoline.
pub(crate) struct YieldBreak;

/// Returns the identity of the calling fiber, or [`FiberId::NONE`] from
/// the main context or a thread without a scheduler.
#[must_use]
pub fn id() -> FiberId {
    current().map_or(FiberId::NONE, |cur| cur.fiber)
}

/// Reschedules the calling fiber at the back of the ready set.
///
/// From the main context this performs one scheduling decision instead;
/// from a thread without a scheduler it yields the OS thread.
pub fn yield_now() {
    match current() {
        Some(cur) if cur.is_fiber() => cur.sched.yield_current(),
        Some(cur) => {
            cur.sched.run_once();
        }
        None => std::thread::yield_now(),
    }
}

/// Terminates the calling fiber immediately, without returning to its
/// entry function.
///
/// To the owner of the handle this is indistinguishable from a clean
/// return. Implemented as unwinding with a private payload; a
/// `catch_unwind` inside the fiber would observe (and must not swallow)
/// the unwind.
///
/// # Panics
///
/// Panics if called outside a fiber.
pub fn yield_break() -> ! {
    assert!(
        current().is_some_and(|cur| cur.is_fiber()),
        "yield_break called outside a fiber"
    );
    panic_any(YieldBreak);
}

/// Parks the calling fiber until the monotonic deadline passes.
///
/// This is an interruption point on entry and on wakeup.
///
/// # Errors
///
/// Fails with `Interrupted` if the fiber is interrupted first.
pub fn sleep_until(deadline: Time) -> Result<()> {
    match current() {
        Some(cur) if cur.is_fiber() => {
            cur.sched.check_interruption(cur.fiber)?;
            cur.sched.prepare_park(Some(deadline));
            match cur.sched.park_commit() {
                Wake::Timeout => Ok(()),
                Wake::Interrupted => Err(crate::error::Error::interrupted()),
                Wake::Ready => {
                    debug_assert!(false, "sleeper woken without timer or interrupt");
                    Ok(())
                }
            }
        }
        Some(cur) => {
            cur.sched.run_until(Some(deadline), || false);
            Ok(())
        }
        None => {
            std::thread::sleep(deadline.saturating_duration_since(clock::now()));
            Ok(())
        }
    }
}

/// Parks the calling fiber for at least `duration`.
///
/// # Errors
///
/// Fails with `Interrupted` if the fiber is interrupted first.
pub fn sleep_for(duration: Duration) -> Result<()> {
    sleep_until(clock::now() + duration)
}

/// The explicit interruption point.
///
/// # Errors
///
/// Fails with `Interrupted` if the calling fiber has interruption enabled
/// and a pending request; the request is consumed.
pub fn interruption_point() -> Result<()> {
    match current() {
        Some(cur) if cur.is_fiber() => cur.sched.check_interruption(cur.fiber),
        _ => Ok(()),
    }
}

/// Returns true if the calling fiber has a pending interruption request.
#[must_use]
pub fn interruption_requested() -> bool {
    current().is_some_and(|cur| cur.is_fiber() && cur.sched.interruption_requested(cur.fiber))
}

/// Disables interruption delivery for the calling fiber until the returned
/// guard is dropped.
///
/// While the guard lives, interruption points are no-ops and wakeups on
/// parked calls do not raise; requests stay pending and fire at the first
/// interruption point after the prior state is restored. Scopes nest.
#[must_use = "interruption is re-enabled as soon as the guard drops"]
pub fn disable_interruption() -> DisableInterruption {
    let restore = match current() {
        Some(cur) if cur.is_fiber() => {
            let prior = cur.sched.set_interrupt_mode(cur.fiber, InterruptMode::Disabled);
            Some((cur, prior))
        }
        _ => None,
    };
    DisableInterruption {
        restore,
        _not_send: PhantomData,
    }
}

/// Scope guard restoring the fiber's prior interruption state on drop.
pub struct DisableInterruption {
    restore: Option<(CurrentHandle, InterruptMode)>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for DisableInterruption {
    fn drop(&mut self) {
        if let Some((cur, prior)) = self.restore.take() {
            cur.sched.set_interrupt_mode(cur.fiber, prior);
        }
    }
}

impl std::fmt::Debug for DisableInterruption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisableInterruption")
            .field("active", &self.restore.is_some())
            .finish()
    }
}

/// Internal hook for primitives that must re-acquire a lock without
/// observing interruption (condvar re-lock after a failed wait).
pub(crate) fn with_interruption_disabled<R>(
    sched: &Arc<SchedulerCore>,
    fiber: FiberId,
    f: impl FnOnce() -> R,
) -> R {
    if fiber.is_none() {
        return f();
    }
    let prior = sched.set_interrupt_mode(fiber, InterruptMode::Disabled);
    let out = f();
    sched.set_interrupt_mode(fiber, prior);
    out
}
