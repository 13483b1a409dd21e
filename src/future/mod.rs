//! Single-shot result handoff: promises, futures, and packaged tasks.
//!
//! A producer constructs a [`Promise`], extracts its one exclusive
//! [`Future`], and hands the future to a consumer fiber. `set_value` /
//! `set_exception` atomically publish into the shared state and wake every
//! parked consumer; an unready `get` or `wait` parks the calling fiber and
//! the scheduler resumes another ready fiber in its place.
//!
//! Producer-side calls may come from any thread; a future must be
//! consumed on the scheduler that owns the consuming fiber, because its
//! wait enrolls in that scheduler's structures.

pub mod future;
pub mod packaged_task;
pub mod promise;
pub mod shared_future;
pub(crate) mod shared_state;

pub use future::Future;
pub use packaged_task::PackagedTask;
pub use promise::Promise;
pub use shared_future::SharedFuture;

use crate::error::SpawnError;
use core::fmt;

/// The outcome of a timed wait on a future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FutureStatus {
    /// The shared state is ready.
    Ready,
    /// The deadline passed before the state became ready.
    Timeout,
    /// Reserved for deferred evaluation; never produced by this runtime.
    Deferred,
}

impl fmt::Display for FutureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Timeout => write!(f, "timeout"),
            Self::Deferred => write!(f, "deferred"),
        }
    }
}

/// Packages `f`, runs it on a freshly spawned detached fiber, and returns
/// the future over its result.
///
/// # Errors
///
/// Fails if no scheduler is installed or the fiber cannot be spawned.
pub fn spawn_async<T, F>(f: F) -> Result<Future<T>, SpawnError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let mut task = PackagedTask::new(f);
    let future = task.get_future().expect("fresh packaged task");
    let mut fiber = crate::fiber::Fiber::spawn(move || {
        let _ = task.run();
    })?;
    fiber.detach();
    Ok(future)
}
