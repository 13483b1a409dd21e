//! The exclusive consumer-side handle over a shared state.

use crate::clock::{self, Clock};
use crate::error::{Error, ErrorKind, Result};
use crate::future::shared_future::SharedFuture;
use crate::future::shared_state::SharedState;
use crate::future::FutureStatus;
use crate::types::Time;
use std::sync::Arc;
use std::time::Duration;

/// The exclusive consumer of one shared state.
///
/// Obtained from [`crate::future::Promise::get_future`] or
/// [`crate::future::PackagedTask::get_future`]. Move-only; `get` consumes
/// the handle, and `share` converts it into a copyable [`SharedFuture`].
#[derive(Debug)]
pub struct Future<T> {
    state: Option<Arc<SharedState<T>>>,
}

// Manual impl: a default future is invalid for any `T`.
impl<T> Default for Future<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T> Future<T> {
    pub(crate) fn attached(state: Arc<SharedState<T>>) -> Self {
        Self { state: Some(state) }
    }

    /// Creates a future with no shared state (`valid() == false`).
    #[must_use]
    pub fn invalid() -> Self {
        Self { state: None }
    }

    /// Returns true while a shared state is attached.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.state.is_some()
    }

    /// Waits for readiness, detaches the state, and returns the result,
    /// moving the value out.
    ///
    /// # Errors
    ///
    /// - `FutureUninitialized` if `valid()` is false.
    /// - `BrokenPromise` if every producer reference dropped unready.
    /// - `Interrupted` if the waiting fiber was interrupted; the state is
    ///   consumed with the handle, as for any other `get` outcome.
    /// - Any failure the producer published.
    pub fn get(mut self) -> Result<T> {
        let state = self
            .state
            .take()
            .ok_or_else(|| Error::new(ErrorKind::FutureUninitialized))?;
        state.take()
    }

    /// Waits for readiness, then returns the published failure, or `None`
    /// if a value is stored. The state stays attached.
    ///
    /// # Errors
    ///
    /// Fails with `FutureUninitialized` or `Interrupted`.
    pub fn failure(&self) -> Result<Option<Error>> {
        self.state()?.failure()
    }

    /// Blocks until the result is ready, without consuming it.
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
    /// clock, converted to the monotonic axis at call time.
    ///
    /// # Errors
    ///
    /// Fails with `FutureUninitialized` or `Interrupted`.
    pub fn wait_until_with<C: Clock>(&self, clock: &C, deadline: Time) -> Result<FutureStatus> {
        self.wait_until(clock::to_monotonic(clock, deadline))
    }

    /// Converts this exclusive future into a copyable [`SharedFuture`]
    /// over the same state; this handle becomes invalid.
    ///
    /// # Errors
    ///
    /// Fails with `NoState` if `valid()` is false.
    pub fn share(mut self) -> Result<SharedFuture<T>> {
        let state = self
            .state
            .take()
            .ok_or_else(|| Error::new(ErrorKind::NoState))?;
        Ok(SharedFuture::attached(state))
    }

    fn state(&self) -> Result<&Arc<SharedState<T>>> {
        self.state
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::FutureUninitialized))
    }
}
