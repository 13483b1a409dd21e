//! Fiber condition variable.
//!
//! [`Condvar::wait`] atomically releases the associated [`Mutex`], parks
//! the calling fiber in the condvar's waiter set, and re-acquires the lock
//! on wakeup — including before an `Interrupted` failure is reported, so
//! the caller always holds the lock when control returns. Timed waits
//! additionally enroll in the scheduler's sleep queue; whichever of the
//! deadline and a notification fires first wins and the other is
//! cancelled.
//!
//! This core generates no spurious wakeups, but callers should still loop
//! on their predicate to stay robust under interruption.

use crate::clock;
use crate::context::Wake;
use crate::error::{Error, Result};
use crate::runtime::current_or_err;
use crate::sync::mutex::MutexGuard;
use crate::sync::wait_list::WaitList;
use crate::types::Time;
use std::time::Duration;

/// Whether a timed wait returned because its deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeoutResult {
    timed_out: bool,
}

impl WaitTimeoutResult {
    /// True if the wait returned because the deadline passed.
    #[must_use]
    pub const fn timed_out(&self) -> bool {
        self.timed_out
    }
}

/// A condition variable for fibers.
#[derive(Debug, Default)]
pub struct Condvar {
    waiters: parking_lot::Mutex<WaitList>,
}

impl Condvar {
    /// Creates a condition variable with no waiters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases `guard`'s mutex, parks until notified, and re-acquires.
    ///
    /// This is an interruption point on entry and on wakeup; on
    /// `Interrupted` the lock has been re-acquired before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Fails with `Interrupted` or `NotInstalled`.
    pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) -> Result<()> {
        self.wait_inner(guard, None).map(|_| ())
    }

    /// As [`wait`](Self::wait), giving up at the monotonic deadline.
    ///
    /// # Errors
    ///
    /// Fails with `Interrupted` or `NotInstalled`.
    pub fn wait_until<T>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        deadline: Time,
    ) -> Result<WaitTimeoutResult> {
        self.wait_inner(guard, Some(deadline))
    }

    /// As [`wait_until`](Self::wait_until) with a relative timeout.
    ///
    /// # Errors
    ///
    /// Fails with `Interrupted` or `NotInstalled`.
    pub fn wait_for<T>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        timeout: Duration,
    ) -> Result<WaitTimeoutResult> {
        self.wait_inner(guard, Some(clock::now() + timeout))
    }

    fn wait_inner<T>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        deadline: Option<Time>,
    ) -> Result<WaitTimeoutResult> {
        let cur = current_or_err()?;
        cur.sched.check_interruption(cur.fiber)?;

        let token = {
            let mut waiters = self.waiters.lock();
            if cur.is_fiber() {
                cur.sched.prepare_park(deadline);
            }
            waiters.enroll(&cur)
        };
        guard.release_for_wait();

        let outcome = if cur.is_fiber() {
            match cur.sched.park_commit() {
                Wake::Ready => cur
                    .sched
                    .check_interruption(cur.fiber)
                    .map(|()| WaitTimeoutResult { timed_out: false }),
                Wake::Timeout => {
                    self.waiters.lock().remove(token);
                    Ok(WaitTimeoutResult { timed_out: true })
                }
                Wake::Interrupted => {
                    self.waiters.lock().remove(token);
                    Err(Error::interrupted())
                }
            }
        } else {
            let notified = cur
                .sched
                .run_until(deadline, || self.waiters.lock().is_notified(token));
            self.waiters.lock().remove(token);
            Ok(WaitTimeoutResult {
                timed_out: !notified,
            })
        };

        guard.reacquire(&cur);
        outcome
    }

    /// Wakes the first waiter in FIFO order, if any.
    pub fn notify_one(&self) {
        self.waiters.lock().notify_one();
    }

    /// Wakes every waiter in FIFO insertion order.
    pub fn notify_all(&self) {
        self.waiters.lock().notify_all();
    }

    /// Returns the number of parked waiters.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.waiters.lock().len()
    }
}
