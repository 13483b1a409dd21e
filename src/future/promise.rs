//! The producer-side handle over a shared state.

use crate::error::{Error, ErrorKind, Result};
use crate::future::future::Future;
use crate::future::shared_state::SharedState;
use std::sync::Arc;

/// A single-shot producer: delivers one value or failure to the consumers
/// of the shared state it created.
///
/// Move-only. Dropping the promise without setting a result makes the
/// state ready with a `broken_promise` failure, so consumers never
/// deadlock on an abandoned producer.
#[derive(Debug)]
pub struct Promise<T> {
    state: Option<Arc<SharedState<T>>>,
}

impl<T> Promise<T> {
    /// Creates a promise over a fresh shared state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Some(SharedState::new()),
        }
    }

    /// Extracts the single exclusive future over this promise's state.
    ///
    /// # Errors
    ///
    /// - `FutureAlreadyRetrieved` on the second call.
    /// - `NoState` if the promise has been consumed.
    pub fn get_future(&mut self) -> Result<Future<T>> {
        let state = self.state()?;
        state.mark_future_retrieved()?;
        Ok(Future::attached(Arc::clone(state)))
    }

    /// Publishes a value, waking every waiting consumer.
    ///
    /// # Errors
    ///
    /// Fails with `PromiseAlreadySatisfied` if a result was already set.
    pub fn set_value(&self, value: T) -> Result<()> {
        self.state()?.set_result(Ok(value))
    }

    /// Publishes a failure, waking every waiting consumer. Consumers
    /// receive a clone of the failure from `get`.
    ///
    /// # Errors
    ///
    /// Fails with `PromiseAlreadySatisfied` if a result was already set.
    pub fn set_exception(&self, failure: Error) -> Result<()> {
        self.state()?.set_result(Err(failure))
    }

    fn state(&self) -> Result<&Arc<SharedState<T>>> {
        self.state
            .as_ref()
            .ok_or_else(|| Error::new(ErrorKind::NoState))
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.producer_dropped();
        }
    }
}
