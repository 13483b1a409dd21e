//! The fiber control block.
//!
//! One [`Fcb`] exists per spawned fiber, owned by the scheduler's fiber
//! table and mutated only under the scheduler lock. It records everything
//! the scheduler needs to know about the fiber: lifecycle status, priority,
//! the saved context, joiners blocked on termination, interruption state,
//! the optional wakeup deadline, and the termination channel.

use crate::context::{Context, Wake};
use crate::error::PanicPayload;
use crate::types::{FiberId, FiberStatus, InterruptMode, Time};
use smallvec::SmallVec;
use std::thread::JoinHandle;

/// Per-fiber state tracked by the scheduler.
#[derive(Debug)]
pub(crate) struct Fcb {
    /// The fiber's identity.
    pub(crate) id: FiberId,
    /// The saved execution context.
    pub(crate) context: Context,
    /// The carrier backing the fiber's stack; taken at reap time.
    pub(crate) carrier: Option<JoinHandle<()>>,
    /// Lifecycle status (state machine in [`FiberStatus`]).
    pub(crate) status: FiberStatus,
    /// Scheduling priority; higher is more eligible.
    pub(crate) priority: i32,
    /// Disposition delivered at the next resume.
    pub(crate) wake: Wake,
    /// Whether interruption requests may be delivered.
    pub(crate) interrupt_mode: InterruptMode,
    /// A deferred interruption request.
    pub(crate) interrupt_pending: bool,
    /// Wakeup deadline while enrolled in the sleep queue.
    pub(crate) deadline: Option<Time>,
    /// Fibers blocked in `join` on this fiber's termination.
    pub(crate) joiners: SmallVec<[FiberId; 2]>,
    /// Termination channel: an uncaught panic from the entry function.
    pub(crate) panic: Option<PanicPayload>,
    /// The owning handle called `detach`.
    pub(crate) detached: bool,
    /// The owning handle completed `join`.
    pub(crate) joined: bool,
}

impl Fcb {
    pub(crate) fn new(
        id: FiberId,
        context: Context,
        carrier: JoinHandle<()>,
        priority: i32,
    ) -> Self {
        Self {
            id,
            context,
            carrier: Some(carrier),
            status: FiberStatus::Ready,
            priority,
            wake: Wake::Ready,
            interrupt_mode: InterruptMode::Enabled,
            interrupt_pending: false,
            deadline: None,
            joiners: SmallVec::new(),
            panic: None,
            detached: false,
            joined: false,
        }
    }

    /// True once the stack may be released: the fiber terminated and the
    /// owning handle joined or detached it.
    pub(crate) fn reapable(&self) -> bool {
        self.status == FiberStatus::Terminated && (self.joined || self.detached)
    }
}
