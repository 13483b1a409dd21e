//! Fiber handles and spawning.
//!
//! A [`Fiber`] is a non-copyable, movable owning handle over one spawned
//! fiber. Spawning places the fiber in the ready set and returns to the
//! caller; the handle must be joined or detached before it is dropped.
//!
//! # Example
//!
//! ```ignore
//! let sched = Scheduler::new();
//! let _guard = sched.install();
//!
//! let mut worker = Fiber::spawn(|| {
//!     this_fiber::yield_now();
//! })?;
//! worker.join()?;
//! ```

pub(crate) mod fcb;

use crate::error::{Error, ErrorKind, Result, SpawnError};
use crate::runtime::{current, SchedulerCore};
use crate::types::{FiberId, FiberStatus};
use std::sync::Arc;

struct FiberInner {
    sched: Arc<SchedulerCore>,
    id: FiberId,
}

/// An owning handle over a spawned fiber.
///
/// Default-constructed handles are empty: they own nothing, report the
/// [`FiberId::NONE`] identity, and are not joinable. Dropping a joinable
/// handle is a hard error (panics); join or detach first.
#[derive(Default)]
pub struct Fiber {
    inner: Option<FiberInner>,
}

impl Fiber {
    /// Creates an empty handle.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Spawns a fiber running `f` on the calling thread's installed
    /// scheduler, with default stack size and priority 0.
    ///
    /// # Errors
    ///
    /// Fails if no scheduler is installed or the stack cannot be reserved.
    pub fn spawn<F>(f: F) -> std::result::Result<Self, SpawnError>
    where
        F: FnOnce() + Send + 'static,
    {
        Builder::new().spawn(f)
    }

    /// Returns a builder for a fiber with custom name, stack, or priority.
    #[must_use]
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// True iff the handle owns an unjoined, undetached fiber.
    #[must_use]
    pub fn joinable(&self) -> bool {
        self.inner.is_some()
    }

    /// True iff the handle owns nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// True while the handle owns a fiber that has not yet terminated.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.as_ref().is_some_and(|inner| {
            inner
                .sched
                .status(inner.id)
                .map_or(false, |s| s != FiberStatus::Terminated)
        })
    }

    /// Returns the owned fiber's identity, or [`FiberId::NONE`] if empty.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.inner.as_ref().map_or(FiberId::NONE, |i| i.id)
    }

    /// Blocks the caller until the owned fiber terminates, then clears
    /// ownership.
    ///
    /// From a fiber, the caller parks in the target's joiner set; from the
    /// scheduler's main context, the run loop is pumped until termination.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the handle is not joinable, or if the call is
    ///   made from a thread the owning scheduler is not installed on.
    /// - `ResourceDeadlock` if the owned fiber is the caller.
    /// - `Interrupted` if the joining fiber is interrupted; ownership is
    ///   retained and the join may be retried.
    /// - `FiberPanicked` if the fiber terminated with an uncaught panic;
    ///   ownership is cleared.
    pub fn join(&mut self) -> Result<()> {
        let Some(inner) = self.inner.as_ref() else {
            return Err(Error::new(ErrorKind::InvalidArgument).with_context("fiber not joinable"));
        };
        let cur = current().ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument)
                .with_context("fiber must be joined on its scheduler's thread")
        })?;
        if !Arc::ptr_eq(&cur.sched, &inner.sched) {
            return Err(Error::new(ErrorKind::InvalidArgument)
                .with_context("fiber must be joined on its scheduler's thread"));
        }
        if cur.fiber == inner.id {
            return Err(Error::new(ErrorKind::ResourceDeadlock).with_context("fiber joined itself"));
        }

        match inner.sched.join(inner.id, cur.fiber) {
            Ok(None) => {
                self.inner = None;
                Ok(())
            }
            Ok(Some(panic)) => {
                self.inner = None;
                Err(Error::panicked(&panic))
            }
            Err(err) => Err(err),
        }
    }

    /// Clears ownership; the fiber runs to completion untracked.
    pub fn detach(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.sched.detach(inner.id);
        }
    }

    /// Requests interruption of the owned fiber (see
    /// [`crate::this_fiber::interruption_point`]).
    pub fn interrupt(&self) {
        if let Some(inner) = self.inner.as_ref() {
            inner.sched.interrupt(inner.id);
        }
    }

    /// Alias for [`interrupt`](Self::interrupt).
    pub fn cancel(&self) {
        self.interrupt();
    }

    /// Returns the fiber's scheduling priority, or 0 for an empty handle.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.inner
            .as_ref()
            .map_or(0, |inner| inner.sched.priority(inner.id))
    }

    /// Changes the fiber's scheduling priority via the policy.
    pub fn set_priority(&self, priority: i32) {
        if let Some(inner) = self.inner.as_ref() {
            inner.sched.set_priority(inner.id, priority);
        }
    }
}

impl Drop for Fiber {
    fn drop(&mut self) {
        if self.inner.is_some() && !std::thread::panicking() {
            panic!("joinable fiber dropped; join or detach it first");
        }
    }
}

impl std::fmt::Debug for Fiber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fiber").field("id", &self.id()).finish()
    }
}

/// Configures and spawns a fiber.
#[must_use]
#[derive(Debug, Default)]
pub struct Builder {
    name: Option<String>,
    stack_size: usize,
    priority: i32,
}

impl Builder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the fiber (also names its carrier).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Requests a stack of at least `size` bytes; zero requests the
    /// scheduler's default.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    /// Sets the initial scheduling priority (default 0).
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Spawns the fiber on the calling thread's installed scheduler.
    ///
    /// # Errors
    ///
    /// Fails if no scheduler is installed or the stack cannot be reserved.
    pub fn spawn<F>(self, f: F) -> std::result::Result<Fiber, SpawnError>
    where
        F: FnOnce() + Send + 'static,
    {
        let cur = current().ok_or(SpawnError::NotInstalled)?;
        let id = cur
            .sched
            .spawn(self.name, self.stack_size, self.priority, Box::new(f))?;
        Ok(Fiber {
            inner: Some(FiberInner {
                sched: cur.sched,
                id,
            }),
        })
    }
}
