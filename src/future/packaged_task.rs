//! A callable bound to a shared state.

use crate::error::{Error, ErrorKind, PanicPayload, Result};
use crate::future::future::Future;
use crate::future::shared_state::SharedState;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Binds a callable to a freshly created shared state.
///
/// Invoking the task runs the callable; its return value becomes the
/// state's value, and a panic raised by it becomes the state's failure.
/// Dropping an un-invoked task abandons the state (`broken_promise`), so a
/// consumer never deadlocks on a task that was never run.
pub struct PackagedTask<T> {
    callable: Option<Box<dyn FnOnce() -> T + Send + 'static>>,
    state: Option<Arc<SharedState<T>>>,
}

impl<T> PackagedTask<T> {
    /// Packages `f` with a fresh shared state.
    #[must_use]
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self {
            callable: Some(Box::new(f)),
            state: Some(SharedState::new()),
        }
    }

    /// Returns true while the task still holds a shared state.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.state.is_some()
    }

    /// Extracts the single exclusive future over the task's state.
    ///
    /// # Errors
    ///
    /// - `FutureAlreadyRetrieved` on the second call.
    /// - `NoState` if the task has been consumed.
    pub fn get_future(&mut self) -> Result<Future<T>> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::NoState))?;
        state.mark_future_retrieved()?;
        Ok(Future::attached(Arc::clone(state)))
    }

    /// Invokes the callable and publishes its outcome into the state.
    ///
    /// A panic inside the callable is captured as the state's failure; a
    /// `yield_break` unwind passes through untouched and abandons the
    /// state.
    ///
    /// # Errors
    ///
    /// - `PromiseAlreadySatisfied` on a second invocation.
    /// - `NoState` if the task has been consumed.
    pub fn run(&mut self) -> Result<()> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::NoState))?;
        let callable = self
            .callable
            .take()
            .ok_or_else(|| Error::new(ErrorKind::PromiseAlreadySatisfied))?;

        match catch_unwind(AssertUnwindSafe(callable)) {
            Ok(value) => state.set_result(Ok(value)),
            Err(payload) => {
                if payload.is::<crate::this_fiber::YieldBreak>() {
                    resume_unwind(payload);
                }
                let captured = PanicPayload::from_any(payload.as_ref());
                state.set_result(Err(Error::panicked(&captured)))
            }
        }
    }
}

impl<T> Drop for PackagedTask<T> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.producer_dropped();
        }
    }
}

impl<T> std::fmt::Debug for PackagedTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackagedTask")
            .field("invoked", &self.callable.is_none())
            .field("valid", &self.valid())
            .finish()
    }
}
