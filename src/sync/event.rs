//! One-shot event.
//!
//! An [`Event`] starts unset; [`Event::set`] latches it permanently and
//! wakes every parked waiter. Waits after the event is set return
//! immediately.

use crate::clock;
use crate::context::Wake;
use crate::error::{Error, Result};
use crate::runtime::current_or_err;
use crate::sync::wait_list::WaitList;
use crate::types::Time;
use std::time::Duration;

#[derive(Debug, Default)]
struct EventState {
    set: bool,
    waiters: WaitList,
}

/// A one-shot, latching event.
#[derive(Debug, Default)]
pub struct Event {
    state: parking_lot::Mutex<EventState>,
}

impl Event {
    /// Creates an unset event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the event has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.state.lock().set
    }

    /// Latches the event and wakes all waiters in FIFO order. Idempotent.
    pub fn set(&self) {
        let mut st = self.state.lock();
        if !st.set {
            st.set = true;
            st.waiters.notify_all();
        }
    }

    /// Parks the caller until the event is set.
    ///
    /// An interruption point on entry and on wakeup.
    ///
    /// # Errors
    ///
    /// Fails with `Interrupted` or `NotInstalled`.
    pub fn wait(&self) -> Result<()> {
        let cur = current_or_err()?;
        cur.sched.check_interruption(cur.fiber)?;

        if cur.is_fiber() {
            let token = {
                let mut st = self.state.lock();
                if st.set {
                    return Ok(());
                }
                cur.sched.prepare_park(None);
                st.waiters.enroll(&cur)
            };
            match cur.sched.park_commit() {
                Wake::Ready => cur.sched.check_interruption(cur.fiber),
                Wake::Interrupted => {
                    self.state.lock().waiters.remove(token);
                    Err(Error::interrupted())
                }
                Wake::Timeout => unreachable!("event wait has no deadline"),
            }
        } else {
            cur.sched.run_until(None, || self.is_set());
            Ok(())
        }
    }

    /// Parks the caller until the event is set or the deadline passes.
    /// Returns true if the event was set.
    ///
    /// # Errors
    ///
    /// Fails with `Interrupted` or `NotInstalled`.
    pub fn wait_until(&self, deadline: Time) -> Result<bool> {
        let cur = current_or_err()?;
        cur.sched.check_interruption(cur.fiber)?;

        if cur.is_fiber() {
            let token = {
                let mut st = self.state.lock();
                if st.set {
                    return Ok(true);
                }
                cur.sched.prepare_park(Some(deadline));
                st.waiters.enroll(&cur)
            };
            match cur.sched.park_commit() {
                Wake::Ready => cur.sched.check_interruption(cur.fiber).map(|()| true),
                Wake::Timeout => {
                    self.state.lock().waiters.remove(token);
                    Ok(false)
                }
                Wake::Interrupted => {
                    self.state.lock().waiters.remove(token);
                    Err(Error::interrupted())
                }
            }
        } else {
            Ok(cur.sched.run_until(Some(deadline), || self.is_set()))
        }
    }

    /// As [`wait_until`](Self::wait_until) with a relative timeout.
    ///
    /// # Errors
    ///
    /// Fails with `Interrupted` or `NotInstalled`.
    pub fn wait_for(&self, timeout: Duration) -> Result<bool> {
        self.wait_until(clock::now() + timeout)
    }
}
