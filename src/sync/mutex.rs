//! Cooperative fiber mutex.
//!
//! A FIFO-fair mutual exclusion lock that parks the calling *fiber* while
//! contended, yielding the host thread to other fibers. Unlock hands
//! ownership directly to the first waiter, so the lock cannot be barged
//! and waiters are serviced in arrival order.
//!
//! The primitive is fiber-aware only. Calls from a scheduler's main
//! context pump the run loop while waiting; calls from a thread without an
//! installed scheduler fail with `NotInstalled`. Recursive locking is not
//! supported and deadlocks the calling fiber.
//!
//! `lock` is an interruption point on entry and on wakeup.

use crate::context::Wake;
use crate::error::{Error, Result};
use crate::runtime::{current_or_err, CurrentHandle, SchedulerCore};
use crate::types::FiberId;
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

#[derive(Debug)]
struct MutexWaiter {
    token: u64,
    fiber: FiberId,
    sched: Arc<SchedulerCore>,
}

#[derive(Debug, Default)]
struct MutexState {
    /// Held by some context (including one being handed the lock).
    locked: bool,
    /// Token of the waiter ownership was handed to, until it claims.
    handoff: Option<u64>,
    next_token: u64,
    waiters: VecDeque<MutexWaiter>,
}

/// A cooperative mutual-exclusion lock around a value.
///
/// # Fairness
///
/// Strictly FIFO: `unlock` dequeues the first live waiter and transfers
/// ownership to it; `try_lock` fails while any waiter queues.
#[derive(Debug, Default)]
pub struct Mutex<T> {
    state: parking_lot::Mutex<MutexState>,
    data: RwLock<T>,
}

impl<T> Mutex<T> {
    /// Creates an unlocked mutex owning `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            state: parking_lot::Mutex::new(MutexState::default()),
            data: RwLock::new(value),
        }
    }

    /// Returns true if the mutex is currently held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Returns the number of parked waiters.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Acquires the mutex, parking the calling fiber while it is held.
    ///
    /// # Errors
    ///
    /// - `Interrupted` if the caller is interrupted before or while
    ///   waiting; the mutex is not acquired.
    /// - `NotInstalled` if the calling thread has no scheduler.
    pub fn lock(&self) -> Result<MutexGuard<'_, T>> {
        let cur = current_or_err()?;
        cur.sched.check_interruption(cur.fiber)?;

        let token = {
            let mut st = self.state.lock();
            if !st.locked {
                st.locked = true;
                drop(st);
                return Ok(self.guard());
            }
            let token = st.next_token;
            st.next_token += 1;
            if cur.is_fiber() {
                cur.sched.prepare_park(None);
            }
            st.waiters.push_back(MutexWaiter {
                token,
                fiber: cur.fiber,
                sched: Arc::clone(&cur.sched),
            });
            token
        };

        if cur.is_fiber() {
            match cur.sched.park_commit() {
                Wake::Ready => {
                    self.claim_handoff(token);
                    // Wakeup interruption point: if a request landed while
                    // ownership was in flight, pass the lock on and fail.
                    if let Err(err) = cur.sched.check_interruption(cur.fiber) {
                        self.unlock();
                        return Err(err);
                    }
                    Ok(self.guard())
                }
                Wake::Interrupted => {
                    let mut st = self.state.lock();
                    st.waiters.retain(|w| w.token != token);
                    Err(Error::interrupted())
                }
                Wake::Timeout => unreachable!("mutex wait has no deadline"),
            }
        } else {
            cur.sched
                .run_until(None, || self.state.lock().handoff == Some(token));
            self.claim_handoff(token);
            Ok(self.guard())
        }
    }

    /// Acquires the mutex without waiting.
    ///
    /// Respects FIFO fairness: fails while any waiter queues, even if the
    /// mutex is momentarily free.
    #[must_use]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let mut st = self.state.lock();
        if st.locked || !st.waiters.is_empty() {
            return None;
        }
        st.locked = true;
        drop(st);
        Some(self.guard())
    }

    /// Returns a mutable reference to the value; no locking is needed
    /// since this borrows the mutex exclusively.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Consumes the mutex, returning the value.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    fn guard(&self) -> MutexGuard<'_, T> {
        MutexGuard {
            mutex: self,
            data: Some(self.data.write()),
        }
    }

    fn claim_handoff(&self, token: u64) {
        let mut st = self.state.lock();
        debug_assert_eq!(st.handoff, Some(token), "handoff token mismatch");
        st.handoff = None;
    }

    /// Releases ownership: hands the lock to the first live waiter, or
    /// marks it free.
    fn unlock(&self) {
        let mut st = self.state.lock();
        debug_assert!(st.locked, "unlock of unowned mutex");
        loop {
            match st.waiters.pop_front() {
                Some(w) => {
                    if w.fiber.is_none() {
                        st.handoff = Some(w.token);
                        w.sched.kick();
                        return;
                    }
                    if w.sched.unpark(w.fiber, Wake::Ready) {
                        st.handoff = Some(w.token);
                        return;
                    }
                    // Waiter already woken by interruption; skip it.
                }
                None => {
                    st.locked = false;
                    return;
                }
            }
        }
    }

    /// Re-acquires the mutex without observing interruption; used by the
    /// condition variable to restore the lock before reporting a wait's
    /// outcome.
    pub(crate) fn relock(&self, cur: &CurrentHandle) {
        crate::this_fiber::with_interruption_disabled(&cur.sched, cur.fiber, || {
            let token = {
                let mut st = self.state.lock();
                if !st.locked {
                    st.locked = true;
                    return;
                }
                let token = st.next_token;
                st.next_token += 1;
                if cur.is_fiber() {
                    cur.sched.prepare_park(None);
                }
                st.waiters.push_back(MutexWaiter {
                    token,
                    fiber: cur.fiber,
                    sched: Arc::clone(&cur.sched),
                });
                token
            };
            if cur.is_fiber() {
                match cur.sched.park_commit() {
                    Wake::Ready => self.claim_handoff(token),
                    Wake::Timeout | Wake::Interrupted => {
                        unreachable!("interruption disabled during relock")
                    }
                }
            } else {
                cur.sched
                    .run_until(None, || self.state.lock().handoff == Some(token));
                self.claim_handoff(token);
            }
        });
    }
}

/// RAII guard releasing the mutex on drop.
#[must_use = "the lock is released as soon as the guard drops"]
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    data: Option<RwLockWriteGuard<'a, T>>,
}

impl<T> MutexGuard<'_, T> {
    /// Releases the lock while keeping the guard alive; the condition
    /// variable re-acquires through [`Self::reacquire`].
    pub(crate) fn release_for_wait(&mut self) {
        self.data = None;
        self.mutex.unlock();
    }

    pub(crate) fn reacquire(&mut self, cur: &CurrentHandle) {
        self.mutex.relock(cur);
        self.data = Some(self.mutex.data.write());
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.data.as_deref().expect("guard data released")
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.data.as_deref_mut().expect("guard data released")
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        // The data guard must be released before ownership is handed to
        // the next waiter.
        if let Some(data) = self.data.take() {
            drop(data);
            self.mutex.unlock();
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutexGuard")
            .field("data", &self.data.as_deref())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Scheduler;

    #[test]
    fn uncontended_lock_from_main() {
        let sched = Scheduler::new();
        let _guard = sched.install();

        let mutex = Mutex::new(42);
        assert!(!mutex.is_locked());
        {
            let mut g = mutex.lock().expect("lock");
            assert!(mutex.is_locked());
            *g += 1;
        }
        assert!(!mutex.is_locked());
        assert_eq!(*mutex.lock().expect("lock"), 43);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let sched = Scheduler::new();
        let _guard = sched.install();

        let mutex = Mutex::new(0);
        let g = mutex.lock().expect("lock");
        assert!(mutex.try_lock().is_none());
        drop(g);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn get_mut_and_into_inner_bypass_locking() {
        let mut mutex = Mutex::new(5);
        *mutex.get_mut() = 10;
        assert_eq!(mutex.into_inner(), 10);
    }

    #[test]
    fn lock_without_scheduler_fails() {
        let mutex = Mutex::new(0);
        let err = mutex.lock().expect_err("no scheduler installed");
        assert_eq!(err.kind(), crate::error::ErrorKind::NotInstalled);
    }
}
