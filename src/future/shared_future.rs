//! The copyable consumer-side handle over a shared state.

use crate::clock::{self, Clock};
use crate::error::{Error, ErrorKind, Result};
use crate::future::shared_state::SharedState;
use crate::future::FutureStatus;
use crate::types::Time;
use std::sync::Arc;
use std::time::Duration;

/// A copyable consumer of one shared state.
///
/// Created by [`crate::future::Future::share`]. Every clone holds one
/// consumer-side reference; `get` leaves the state readable, so any number
/// of fibers can each observe the result. The state is released when the
/// last clone drops.
#[derive(Debug)]
pub struct SharedFuture<T> {
    state: Option<Arc<SharedState<T>>>,
}

// Manual impl: a default shared future is invalid for any `T`.
impl<T> Default for SharedFuture<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T> SharedFuture<T> {
    pub(crate) fn attached(state: Arc<SharedState<T>>) -> Self {
        Self { state: Some(state) }
    }

    /// Creates a shared future with no state (`valid() == false`).
    #[must_use]
    pub fn invalid() -> Self {
        Self { state: None }
    }

    /// Returns true while a shared state is attached. Stays true across
    /// `get`.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.state.is_some()
    }

    /// Waits for readiness, then returns the published failure, or `None`
    /// if a value is stored.
    ///
    /// # Errors
    ///
    /// Fails with `FutureUninitialized` or `Interrupted`.
    pub fn failure(&self) -> Result<Option<Error>> {
        self.state()?.failure()
    }

    /// Blocks until the result is ready.
    ///
    /// # Errors
    ///
    /// Fails with `FutureUninitialized` or `Interrupted`.
    pub fn wait(&self) -> Result<()> {
        self.state()?.wait()
    }

    /// Blocks until the result is ready or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Fails with `FutureUninitialized` or `Interrupted`.
    pub fn wait_for(&self, timeout: Duration) -> Result<FutureStatus> {
        self.wait_until(clock::now() + timeout)
    }

    /// Blocks until the result is ready or the monotonic deadline passes.
    ///
    /// # Errors
    ///
    /// Fails with `FutureUninitialized` or `Interrupted`.
    pub fn wait_until(&self, deadline: Time) -> Result<FutureStatus> {
        self.state()?.wait_until(deadline)
    }

    /// As [`wait_until`](Self::wait_until) with a deadline on an arbitrary
    /// clock.
    ///
    /// # Errors
    ///
    /// Fails with `FutureUninitialized` or `Interrupted`.
    pub fn wait_until_with<C: Clock>(&self, clock: &C, deadline: Time) -> Result<FutureStatus> {
        self.wait_until(clock::to_monotonic(clock, deadline))
    }

    fn state(&self) -> Result<&Arc<SharedState<T>>> {
        self.state
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::FutureUninitialized))
    }
}

impl<T: Clone> SharedFuture<T> {
    /// Waits for readiness and returns a copy of the result; the state
    /// remains observable and `valid()` stays true.
    ///
    /// # Errors
    ///
    /// As [`crate::future::Future::get`], except the handle survives.
    pub fn get(&self) -> Result<T> {
        self.state()?.read()
    }
}

// Manual impl: clones share the state without requiring `T: Clone`.
impl<T> Clone for SharedFuture<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}
