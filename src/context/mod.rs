//! The symmetric context-switch primitive under the scheduler.
//!
//! A [`Context`] represents one suspended execution. [`make_context`]
//! creates a context whose first resumption runs its entry function on a
//! freshly reserved stack; [`Context::switch_to`] saves the caller and
//! resumes the target, returning whatever payload the next switch back
//! delivers. The primitive is symmetric: there is no implicit parent, and
//! the scheduler is just another context.
//!
//! The switch is realized over carrier threads: each made context is an OS
//! thread blocked on a rendezvous cell except while it holds the baton.
//! Exactly one context per scheduler runs at any instant, and the baton
//! never duplicates, so fiber code observes single-threaded execution. The
//! carrier's stack is the fiber's stack; its size comes from the
//! [`crate::stack`] allocator contract. An assembly or ucontext switch
//! could replace this module without touching the scheduler, which depends
//! only on the pair exposed here.

use crate::stack::Stack;
use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// The payload carried across a context switch: why the resumed side woke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The awaited event occurred (or the fiber was scheduled normally).
    Ready,
    /// The wakeup deadline passed first.
    Timeout,
    /// An interruption request was delivered.
    Interrupted,
}

#[derive(Default)]
struct RendezvousCell {
    baton: Mutex<Option<Wake>>,
    resumed: Condvar,
}

/// A handle to one suspended (or running) execution.
///
/// Cloning the handle does not clone the execution; clones address the same
/// rendezvous cell.
#[derive(Clone, Default)]
pub struct Context {
    cell: Arc<RendezvousCell>,
}

impl Context {
    /// Creates the context of the calling thread itself.
    ///
    /// Used for the scheduler's main context, which is never spawned.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Atomically suspends the caller and resumes `target`.
    ///
    /// Returns the payload delivered by the next switch back to the caller.
    /// No heap allocation occurs on this path.
    pub fn switch_to(&self, target: &Context, payload: Wake) -> Wake {
        target.resume(payload);
        self.wait()
    }

    /// Deposits a payload into this context's cell without suspending the
    /// caller.
    ///
    /// This is the one-way half of a switch, used when the current
    /// execution is finished and will never be resumed (fiber exit).
    pub(crate) fn resume(&self, payload: Wake) {
        let mut baton = self.cell.baton.lock();
        debug_assert!(baton.is_none(), "context resumed while already runnable");
        *baton = Some(payload);
        self.cell.resumed.notify_one();
    }

    /// Blocks the calling carrier until a payload is deposited.
    pub(crate) fn wait(&self) -> Wake {
        let mut baton = self.cell.baton.lock();
        loop {
            if let Some(payload) = baton.take() {
                return payload;
            }
            self.cell.resumed.wait(&mut baton);
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").finish_non_exhaustive()
    }
}

/// Creates a suspended execution on the given stack.
///
/// The first payload switched to the returned context starts `entry`,
/// which receives that payload. When `entry` returns, the carrier exits;
/// the execution must have switched away for the last time before that
/// (the scheduler's finalize path guarantees it).
///
/// # Errors
///
/// Fails if the OS refuses to reserve the carrier.
pub fn make_context<F>(
    stack: Stack,
    name: Option<String>,
    entry: F,
) -> io::Result<(Context, JoinHandle<()>)>
where
    F: FnOnce(Wake) + Send + 'static,
{
    let context = Context::root();
    let cell = context.clone();
    let mut builder = thread::Builder::new().stack_size(stack.size());
    if let Some(name) = name {
        builder = builder.name(name);
    }
    let carrier = builder.spawn(move || {
        let first = cell.wait();
        entry(first);
    })?;
    Ok((context, carrier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{DefaultStackAllocator, StackAllocator};

    #[test]
    fn first_resume_starts_entry_with_payload() {
        let stack = DefaultStackAllocator::default().allocate(0);
        let root = Context::root();
        let root_for_entry = root.clone();
        let (ctx, carrier) = make_context(stack, Some("ctx-test".into()), move |first| {
            assert_eq!(first, Wake::Ready);
            root_for_entry.resume(Wake::Ready);
        })
        .expect("carrier spawn");

        let back = root.switch_to(&ctx, Wake::Ready);
        assert_eq!(back, Wake::Ready);
        carrier.join().expect("carrier exited cleanly");
    }

    #[test]
    fn payload_round_trips_across_switches() {
        let stack = DefaultStackAllocator::default().allocate(0);
        let root = Context::root();
        let root_in = root.clone();
        let (ctx, carrier) = make_context(stack, None, move |first| {
            assert_eq!(first, Wake::Timeout);
            root_in.resume(Wake::Interrupted);
        })
        .expect("carrier spawn");

        let back = root.switch_to(&ctx, Wake::Timeout);
        assert_eq!(back, Wake::Interrupted);
        carrier.join().expect("carrier exited cleanly");
    }

    #[test]
    fn deposit_before_wait_is_buffered() {
        let ctx = Context::root();
        ctx.resume(Wake::Ready);
        assert_eq!(ctx.wait(), Wake::Ready);
    }
}
