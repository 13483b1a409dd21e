//! The one-shot result cell behind promises, futures, and packaged tasks.
//!
//! A shared state transitions from unready to ready at most once; once
//! ready, the stored value or failure is immutable (the exclusive consumer
//! may move the value out at `take`, which consumes rather than mutates
//! the slot — the state stays ready). Readiness is published under the
//! state's mutex, which carries the happens-before edge from the
//! producer's preceding writes to every consumer's return from a wait.
//!
//! Ownership is dual-counted: the producer side holds an explicit count,
//! and dropping it to zero before readiness installs a `broken_promise`
//! failure ([`SharedState::owner_destroyed`]); the consumer side rides the
//! `Arc` strong count, so zeroing both sides deallocates the cell.
//!
//! Fibers park in the cell's waiter set; waits from threads without an
//! installed scheduler block on the cell's condvar (the producer side is
//! callable from any thread).

use crate::clock;
use crate::context::Wake;
use crate::error::{Error, ErrorKind, Result};
use crate::future::FutureStatus;
use crate::runtime::current;
use crate::sync::wait_list::WaitList;
use crate::types::Time;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

struct Inner<T> {
    /// Latches on the first successful `set_result`; survives `take`.
    ready: bool,
    result: Option<Result<T>>,
    future_retrieved: bool,
    waiters: WaitList,
}

/// The shared result cell.
pub(crate) struct SharedState<T> {
    inner: Mutex<Inner<T>>,
    /// Wakes waits made from threads without a scheduler.
    ready_cv: Condvar,
    /// Producer-side reference count.
    producers: AtomicUsize,
}

impl<T> SharedState<T> {
    /// Creates a cell with one producer-side reference.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                ready: false,
                result: None,
                future_retrieved: false,
                waiters: WaitList::new(),
            }),
            ready_cv: Condvar::new(),
            producers: AtomicUsize::new(1),
        })
    }

    /// Returns true once a value or failure has been published.
    pub(crate) fn is_ready(&self) -> bool {
        self.inner.lock().ready
    }

    /// Extracts the single exclusive future.
    pub(crate) fn mark_future_retrieved(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.future_retrieved {
            return Err(Error::new(ErrorKind::FutureAlreadyRetrieved));
        }
        inner.future_retrieved = true;
        Ok(())
    }

    /// Publishes the result, waking every waiter.
    ///
    /// # Errors
    ///
    /// Fails with `PromiseAlreadySatisfied` if the state is already ready.
    pub(crate) fn set_result(&self, result: Result<T>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.ready {
            return Err(Error::new(ErrorKind::PromiseAlreadySatisfied));
        }
        inner.ready = true;
        inner.result = Some(result);
        trace!("shared state made ready");
        inner.waiters.notify_all();
        self.ready_cv.notify_all();
        Ok(())
    }

    /// Called when the last producer-side reference drops: if the state is
    /// still unready, installs a `broken_promise` failure and drains the
    /// waiters.
    pub(crate) fn owner_destroyed(&self) {
        let mut inner = self.inner.lock();
        if !inner.ready {
            inner.ready = true;
            inner.result = Some(Err(Error::broken_promise()));
            trace!("producer abandoned unready shared state");
            inner.waiters.notify_all();
            self.ready_cv.notify_all();
        }
    }

    /// Drops one producer-side reference.
    pub(crate) fn producer_dropped(&self) {
        if self.producers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.owner_destroyed();
        }
    }

    /// Blocks the caller until the state is ready.
    ///
    /// An interruption point on entry and on wakeup for fiber callers.
    pub(crate) fn wait(&self) -> Result<()> {
        match current() {
            Some(cur) if cur.is_fiber() => {
                cur.sched.check_interruption(cur.fiber)?;
                let token = {
                    let mut inner = self.inner.lock();
                    if inner.ready {
                        return Ok(());
                    }
                    cur.sched.prepare_park(None);
                    inner.waiters.enroll(&cur)
                };
                match cur.sched.park_commit() {
                    Wake::Ready => cur.sched.check_interruption(cur.fiber),
                    Wake::Interrupted => {
                        self.inner.lock().waiters.remove(token);
                        Err(Error::interrupted())
                    }
                    Wake::Timeout => unreachable!("untimed wait has no deadline"),
                }
            }
            Some(cur) => {
                // Main context: enroll so a cross-thread producer kicks the
                // blocked host thread, then pump the run loop.
                let token = {
                    let mut inner = self.inner.lock();
                    if inner.ready {
                        return Ok(());
                    }
                    inner.waiters.enroll(&cur)
                };
                cur.sched.run_until(None, || self.is_ready());
                self.inner.lock().waiters.remove(token);
                Ok(())
            }
            None => {
                let mut inner = self.inner.lock();
                while !inner.ready {
                    self.ready_cv.wait(&mut inner);
                }
                Ok(())
            }
        }
    }

    /// Blocks until the state is ready or the monotonic deadline passes.
    ///
    /// The caller is un-enrolled from the waiter set atomically with the
    /// losing outcome, so a late `set_result` cannot wake a departed
    /// waiter.
    pub(crate) fn wait_until(&self, deadline: Time) -> Result<FutureStatus> {
        match current() {
            Some(cur) if cur.is_fiber() => {
                cur.sched.check_interruption(cur.fiber)?;
                let token = {
                    let mut inner = self.inner.lock();
                    if inner.ready {
                        return Ok(FutureStatus::Ready);
                    }
                    cur.sched.prepare_park(Some(deadline));
                    inner.waiters.enroll(&cur)
                };
                match cur.sched.park_commit() {
                    Wake::Ready => cur
                        .sched
                        .check_interruption(cur.fiber)
                        .map(|()| FutureStatus::Ready),
                    Wake::Timeout => {
                        self.inner.lock().waiters.remove(token);
                        Ok(FutureStatus::Timeout)
                    }
                    Wake::Interrupted => {
                        self.inner.lock().waiters.remove(token);
                        Err(Error::interrupted())
                    }
                }
            }
            Some(cur) => {
                let token = {
                    let mut inner = self.inner.lock();
                    if inner.ready {
                        return Ok(FutureStatus::Ready);
                    }
                    inner.waiters.enroll(&cur)
                };
                let ready = cur.sched.run_until(Some(deadline), || self.is_ready());
                self.inner.lock().waiters.remove(token);
                Ok(if ready {
                    FutureStatus::Ready
                } else {
                    FutureStatus::Timeout
                })
            }
            None => {
                let instant = clock::instant_at(deadline);
                let mut inner = self.inner.lock();
                while !inner.ready {
                    if self.ready_cv.wait_until(&mut inner, instant).timed_out() {
                        return Ok(if inner.ready {
                            FutureStatus::Ready
                        } else {
                            FutureStatus::Timeout
                        });
                    }
                }
                Ok(FutureStatus::Ready)
            }
        }
    }

    /// Waits, then moves the value out (exclusive-consumer path).
    pub(crate) fn take(&self) -> Result<T> {
        self.wait()?;
        let mut inner = self.inner.lock();
        match inner.result.take() {
            Some(Ok(value)) => Ok(value),
            Some(Err(err)) => {
                // Failures stay readable (a shared future may still probe).
                inner.result = Some(Err(err.clone()));
                Err(err)
            }
            None => Err(Error::new(ErrorKind::NoState).with_context("result already consumed")),
        }
    }

    /// Waits, then returns the failure, if the state holds one.
    ///
    /// `Ok(None)` means a value is stored.
    pub(crate) fn failure(&self) -> Result<Option<Error>> {
        self.wait()?;
        let inner = self.inner.lock();
        Ok(match inner.result.as_ref() {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        })
    }
}

impl<T: Clone> SharedState<T> {
    /// Waits, then clones the value out, leaving the state readable
    /// (shared-consumer path).
    pub(crate) fn read(&self) -> Result<T> {
        self.wait()?;
        let inner = self.inner.lock();
        match inner.result.as_ref() {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(err)) => Err(err.clone()),
            None => Err(Error::new(ErrorKind::NoState).with_context("result already consumed")),
        }
    }
}

impl<T> std::fmt::Debug for SharedState<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("ready", &self.is_ready())
            .field("producers", &self.producers.load(Ordering::Relaxed))
            .finish()
    }
}
