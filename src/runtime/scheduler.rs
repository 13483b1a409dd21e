//! The scheduler core: fiber table, run loop, and park/unpark protocol.
//!
//! One scheduler serves one host thread. All fibers of a scheduler run
//! sequentially on that thread's carrier set, serialized by the context
//! baton; the scheduler's internal lock orders bookkeeping against
//! cross-thread producers (shared-state `set_value` from another thread)
//! and is never held across a context switch.
//!
//! The run loop lives in the main context: every scheduling decision first
//! drains expired sleepers into the policy, then asks the policy for the
//! next fiber. When nothing is ready and sleepers exist, the host thread
//! blocks on the kick condvar until the earliest deadline or an external
//! wakeup.

use crate::clock;
use crate::context::{Context, Wake};
use crate::error::{Error, PanicPayload, Result, SpawnError};
use crate::fiber::fcb::Fcb;
use crate::runtime::algorithm::SchedulingAlgorithm;
use crate::runtime::builder::SchedulerConfig;
use crate::runtime::sleep_queue::SleepQueue;
use crate::stack::StackAllocator;
use crate::types::{FiberId, FiberStatus, InterruptMode, Time};
use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, trace};

thread_local! {
    static CURRENT: RefCell<Option<CurrentHandle>> = const { RefCell::new(None) };
}

/// The calling context's scheduler binding: which scheduler serves this
/// thread, and which fiber (if any) is executing the call.
#[derive(Clone)]
pub(crate) struct CurrentHandle {
    pub(crate) sched: Arc<SchedulerCore>,
    pub(crate) fiber: FiberId,
}

impl CurrentHandle {
    pub(crate) fn is_fiber(&self) -> bool {
        !self.fiber.is_none()
    }
}

/// Returns the calling context's scheduler binding, if a scheduler is
/// installed on this thread.
pub(crate) fn current() -> Option<CurrentHandle> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Returns the binding or a `NotInstalled` error.
pub(crate) fn current_or_err() -> Result<CurrentHandle> {
    current().ok_or_else(|| {
        Error::new(crate::error::ErrorKind::NotInstalled)
            .with_context("operation requires an installed scheduler")
    })
}

struct SchedState {
    policy: Box<dyn SchedulingAlgorithm>,
    sleepers: SleepQueue,
    fibers: HashMap<FiberId, Fcb>,
    current: FiberId,
    kick_pending: bool,
}

/// The shared core behind [`Scheduler`] and every fiber handle.
pub(crate) struct SchedulerCore {
    state: Mutex<SchedState>,
    kick_cv: Condvar,
    main: Context,
    config: SchedulerConfig,
}

impl SchedulerCore {
    pub(crate) fn new(config: SchedulerConfig, policy: Box<dyn SchedulingAlgorithm>) -> Self {
        Self {
            state: Mutex::new(SchedState {
                policy,
                sleepers: SleepQueue::default(),
                fibers: HashMap::new(),
                current: FiberId::NONE,
                kick_pending: false,
            }),
            kick_cv: Condvar::new(),
            main: Context::root(),
            config,
        }
    }

    // === Spawn and teardown ===

    pub(crate) fn spawn(
        self: &Arc<Self>,
        name: Option<String>,
        stack_size: usize,
        priority: i32,
        f: Box<dyn FnOnce() + Send + 'static>,
    ) -> std::result::Result<FiberId, SpawnError> {
        let id = FiberId::next();
        let stack = self.config.allocator.allocate(stack_size);
        let thread_name = name.unwrap_or_else(|| format!("{}-{id}", self.config.name_prefix));

        let sched = Arc::clone(self);
        let (context, carrier) =
            crate::context::make_context(stack, Some(thread_name), move |_first| {
                CURRENT.with(|c| {
                    *c.borrow_mut() = Some(CurrentHandle {
                        sched: Arc::clone(&sched),
                        fiber: id,
                    });
                });
                let outcome = catch_unwind(AssertUnwindSafe(f));
                let panic = match outcome {
                    Ok(()) => None,
                    Err(payload) => {
                        if payload.is::<crate::this_fiber::YieldBreak>() {
                            None
                        } else {
                            Some(PanicPayload::from_any(payload.as_ref()))
                        }
                    }
                };
                CURRENT.with(|c| c.borrow_mut().take());
                sched.finalize_current(panic);
            })?;

        let mut st = self.state.lock();
        st.fibers.insert(id, Fcb::new(id, context, carrier, priority));
        st.policy.awakened(id, priority);
        if priority != 0 {
            // Initial placement honors a non-default priority.
            st.policy.priority_changed(id, priority);
        }
        debug!(fiber = %id, priority, "fiber spawned");
        Ok(id)
    }

    /// Marks the running fiber terminated, wakes its joiners, and departs
    /// to the main context. Runs on the fiber's carrier; never returns to
    /// fiber code.
    fn finalize_current(&self, panic: Option<PanicPayload>) {
        let main = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let id = st.current;
            debug!(fiber = %id, panicked = panic.is_some(), "fiber terminated");
            let joiners = {
                let fcb = st.fibers.get_mut(&id).expect("terminating unknown fiber");
                fcb.status = FiberStatus::Terminated;
                fcb.panic = panic;
                std::mem::take(&mut fcb.joiners)
            };
            for joiner in joiners {
                self.unpark_locked(st, joiner, Wake::Ready);
            }
            self.main.clone()
        };
        main.resume(Wake::Ready);
    }

    // === Run loop (main context only) ===

    /// Performs one scheduling decision. Returns false if nothing was
    /// ready to run.
    pub(crate) fn run_once(&self) -> bool {
        let (id, ctx, wake) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            Self::wake_sleepers_locked(st);
            let Some(id) = st.policy.pick_next() else {
                return false;
            };
            let fcb = st.fibers.get_mut(&id).expect("picked unknown fiber");
            debug_assert_eq!(fcb.status, FiberStatus::Ready);
            fcb.status = FiberStatus::Running;
            st.current = id;
            (
                id,
                fcb.context.clone(),
                std::mem::replace(&mut fcb.wake, Wake::Ready),
            )
        };

        trace!(fiber = %id, ?wake, "switching to fiber");
        let _ = self.main.switch_to(&ctx, wake);
        trace!(fiber = %id, "returned to main context");

        let carrier = {
            let mut st = self.state.lock();
            st.current = FiberId::NONE;
            Self::take_carrier_if_reapable(&mut st, id)
        };
        if let Some(carrier) = carrier {
            let _ = carrier.join();
        }
        true
    }

    /// Runs the scheduler from the main context until `pred` holds or the
    /// deadline passes. Returns true if `pred` was satisfied.
    ///
    /// The main context runs user code between schedules: main-context
    /// joins and future waits pump the loop here.
    pub(crate) fn run_until(&self, deadline: Option<Time>, mut pred: impl FnMut() -> bool) -> bool {
        loop {
            if pred() {
                return true;
            }
            if let Some(t) = deadline {
                if clock::now() >= t {
                    return false;
                }
            }
            if self.run_once() {
                continue;
            }

            // Nothing ready: block until the earliest deadline or a kick.
            let mut st = self.state.lock();
            if st.kick_pending {
                st.kick_pending = false;
                continue;
            }
            let mut wake_at = st.sleepers.earliest();
            if let Some(t) = deadline {
                wake_at = Some(wake_at.map_or(t, |e| e.min(t)));
            }
            match wake_at {
                Some(t) => {
                    let _ = self.kick_cv.wait_until(&mut st, clock::instant_at(t));
                }
                None => self.kick_cv.wait(&mut st),
            }
            st.kick_pending = false;
        }
    }

    /// Runs until no fiber is ready and no fiber is sleeping.
    pub(crate) fn drain(&self) {
        loop {
            if self.run_once() {
                continue;
            }
            let mut st = self.state.lock();
            let Some(t) = st.sleepers.earliest() else {
                return;
            };
            let _ = self.kick_cv.wait_until(&mut st, clock::instant_at(t));
            st.kick_pending = false;
        }
    }

    fn wake_sleepers_locked(st: &mut SchedState) {
        let now = clock::now();
        for id in st.sleepers.pop_expired(now) {
            if let Some(fcb) = st.fibers.get_mut(&id) {
                debug_assert_eq!(fcb.status, FiberStatus::Waiting);
                fcb.status = FiberStatus::Ready;
                fcb.wake = Wake::Timeout;
                fcb.deadline = None;
                st.policy.awakened(id, fcb.priority);
                trace!(fiber = %id, "sleeper expired");
            }
        }
    }

    // === Suspension (fiber context only) ===

    /// Reschedules the running fiber at the back of the ready set and
    /// returns to the main context.
    pub(crate) fn yield_current(&self) {
        let (ctx, main) = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let id = st.current;
            debug_assert!(!id.is_none(), "yield outside a fiber");
            let fcb = st.fibers.get_mut(&id).expect("yielding unknown fiber");
            fcb.status = FiberStatus::Ready;
            fcb.wake = Wake::Ready;
            st.policy.awakened(id, fcb.priority);
            (fcb.context.clone(), self.main.clone())
        };
        let _ = ctx.switch_to(&main, Wake::Ready);
    }

    /// Marks the running fiber as waiting and, with a deadline, enrolls it
    /// in the sleep queue. Must be followed by [`Self::park_commit`]; the
    /// caller registers in a waiter set in between, while still holding
    /// the primitive's lock.
    pub(crate) fn prepare_park(&self, deadline: Option<Time>) {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let id = st.current;
        debug_assert!(!id.is_none(), "park outside a fiber");
        let fcb = st.fibers.get_mut(&id).expect("parking unknown fiber");
        debug_assert_eq!(fcb.status, FiberStatus::Running);
        fcb.status = FiberStatus::Waiting;
        fcb.wake = Wake::Ready;
        if let Some(t) = deadline {
            fcb.deadline = Some(t);
            st.sleepers.insert(t, id);
        }
        trace!(fiber = %id, ?deadline, "fiber parking");
    }

    /// Switches the prepared fiber out; returns the wake disposition.
    pub(crate) fn park_commit(&self) -> Wake {
        let (ctx, main) = {
            let st = self.state.lock();
            let fcb = st.fibers.get(&st.current).expect("parking unknown fiber");
            (fcb.context.clone(), self.main.clone())
        };
        let wake = ctx.switch_to(&main, Wake::Ready);
        trace!(?wake, "fiber unparked");
        wake
    }

    // === Wakeups (any thread) ===

    /// Makes a parked fiber ready with the given disposition. Returns
    /// false if the fiber was not parked (already woken, running, or
    /// terminated) — the caller should then pick another waiter.
    ///
    /// A `FiberId::NONE` target names a main-context waiter: there is
    /// nothing to schedule, the host thread is just kicked.
    pub(crate) fn unpark(&self, fiber: FiberId, wake: Wake) -> bool {
        let mut st = self.state.lock();
        self.unpark_locked(&mut st, fiber, wake)
    }

    fn unpark_locked(&self, st: &mut SchedState, fiber: FiberId, wake: Wake) -> bool {
        if fiber.is_none() {
            st.kick_pending = true;
            self.kick_cv.notify_all();
            return true;
        }
        let Some(fcb) = st.fibers.get_mut(&fiber) else {
            return false;
        };
        if fcb.status != FiberStatus::Waiting {
            return false;
        }
        fcb.status = FiberStatus::Ready;
        fcb.wake = wake;
        if fcb.deadline.take().is_some() {
            st.sleepers.remove(fiber);
        }
        st.policy.awakened(fiber, fcb.priority);
        st.kick_pending = true;
        self.kick_cv.notify_all();
        trace!(fiber = %fiber, ?wake, "fiber made ready");
        true
    }

    /// Kicks the host thread out of an idle block.
    pub(crate) fn kick(&self) {
        let mut st = self.state.lock();
        st.kick_pending = true;
        self.kick_cv.notify_all();
    }

    // === Interruption ===

    /// Requests interruption of a fiber. If the fiber is parked with
    /// interruption enabled, it is woken with an `Interrupted`
    /// disposition; otherwise the request stays pending.
    pub(crate) fn interrupt(&self, fiber: FiberId) {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let Some(fcb) = st.fibers.get_mut(&fiber) else {
            return;
        };
        if fcb.status == FiberStatus::Terminated {
            return;
        }
        fcb.interrupt_pending = true;
        debug!(fiber = %fiber, status = %fcb.status, "interruption requested");
        if fcb.status == FiberStatus::Waiting && fcb.interrupt_mode.is_enabled() {
            fcb.interrupt_pending = false;
            fcb.status = FiberStatus::Ready;
            fcb.wake = Wake::Interrupted;
            if fcb.deadline.take().is_some() {
                st.sleepers.remove(fiber);
            }
            st.policy.awakened(fiber, fcb.priority);
            st.kick_pending = true;
            self.kick_cv.notify_all();
        }
    }

    /// The explicit interruption point: raises if the fiber has a pending
    /// request and interruption is enabled. A no-op on the main context.
    pub(crate) fn check_interruption(&self, fiber: FiberId) -> Result<()> {
        if fiber.is_none() {
            return Ok(());
        }
        let mut st = self.state.lock();
        let Some(fcb) = st.fibers.get_mut(&fiber) else {
            return Ok(());
        };
        if fcb.interrupt_mode.is_enabled() && fcb.interrupt_pending {
            fcb.interrupt_pending = false;
            return Err(Error::interrupted());
        }
        Ok(())
    }

    /// Returns true if the fiber has a pending interruption request.
    pub(crate) fn interruption_requested(&self, fiber: FiberId) -> bool {
        self.state
            .lock()
            .fibers
            .get(&fiber)
            .is_some_and(|f| f.interrupt_pending)
    }

    /// Swaps the fiber's interruption mode, returning the prior mode.
    pub(crate) fn set_interrupt_mode(&self, fiber: FiberId, mode: InterruptMode) -> InterruptMode {
        let mut st = self.state.lock();
        match st.fibers.get_mut(&fiber) {
            Some(fcb) => std::mem::replace(&mut fcb.interrupt_mode, mode),
            None => InterruptMode::Enabled,
        }
    }

    // === Handle support ===

    pub(crate) fn status(&self, fiber: FiberId) -> Option<FiberStatus> {
        self.state.lock().fibers.get(&fiber).map(|f| f.status)
    }

    pub(crate) fn priority(&self, fiber: FiberId) -> i32 {
        self.state.lock().fibers.get(&fiber).map_or(0, |f| f.priority)
    }

    pub(crate) fn set_priority(&self, fiber: FiberId, priority: i32) {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        if let Some(fcb) = st.fibers.get_mut(&fiber) {
            fcb.priority = priority;
            st.policy.priority_changed(fiber, priority);
        }
    }

    /// Blocks the caller until the fiber terminates, then consumes its
    /// termination channel. `Ok(Some(_))` reports an uncaught panic.
    pub(crate) fn join(&self, target: FiberId, joiner: FiberId) -> Result<Option<PanicPayload>> {
        self.check_interruption(joiner)?;

        if joiner.is_none() {
            // Main context: pump the run loop until the target terminates.
            self.run_until(None, || {
                self.state
                    .lock()
                    .fibers
                    .get(&target)
                    .map_or(true, |f| f.status == FiberStatus::Terminated)
            });
            return Ok(self.finish_join(target));
        }

        loop {
            {
                let mut st = self.state.lock();
                let Some(fcb) = st.fibers.get_mut(&target) else {
                    return Ok(None);
                };
                if fcb.status == FiberStatus::Terminated {
                    break;
                }
                fcb.joiners.push(joiner);
            }
            self.prepare_park(None);
            match self.park_commit() {
                Wake::Ready => {}
                Wake::Interrupted => {
                    let mut st = self.state.lock();
                    if let Some(fcb) = st.fibers.get_mut(&target) {
                        fcb.joiners.retain(|j| *j != joiner);
                    }
                    return Err(Error::interrupted());
                }
                Wake::Timeout => unreachable!("join parked without a deadline"),
            }
        }
        Ok(self.finish_join(target))
    }

    /// Marks the target joined, reaps its carrier, and takes its panic.
    fn finish_join(&self, target: FiberId) -> Option<PanicPayload> {
        let (panic, carrier) = {
            let mut st = self.state.lock();
            let panic = {
                let Some(fcb) = st.fibers.get_mut(&target) else {
                    return None;
                };
                debug_assert_eq!(fcb.status, FiberStatus::Terminated);
                fcb.joined = true;
                fcb.panic.take()
            };
            (panic, Self::take_carrier_if_reapable(&mut st, target))
        };
        if let Some(carrier) = carrier {
            let _ = carrier.join();
        }
        panic
    }

    /// Severs the handle: the fiber runs to completion untracked.
    pub(crate) fn detach(&self, fiber: FiberId) {
        let carrier = {
            let mut st = self.state.lock();
            let detached = st.fibers.get_mut(&fiber).map(|fcb| {
                fcb.detached = true;
            });
            if detached.is_none() {
                return;
            }
            Self::take_carrier_if_reapable(&mut st, fiber)
        };
        if let Some(carrier) = carrier {
            let _ = carrier.join();
        }
    }

    /// Removes the FCB and surrenders its carrier once the fiber has
    /// terminated and been joined or detached (stack-release invariant).
    fn take_carrier_if_reapable(st: &mut SchedState, fiber: FiberId) -> Option<JoinHandle<()>> {
        let reapable = st.fibers.get(&fiber).is_some_and(Fcb::reapable);
        if reapable {
            let mut fcb = st.fibers.remove(&fiber)?;
            trace!(fiber = %fiber, "fiber reaped");
            return fcb.carrier.take();
        }
        None
    }

    // === Policy management ===

    /// Replaces the scheduling policy, migrating pending ready fibers.
    pub(crate) fn replace_policy(&self, mut policy: Box<dyn SchedulingAlgorithm>) {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        let mut migrated = 0_usize;
        while let Some(id) = st.policy.pick_next() {
            let priority = st.fibers.get(&id).map_or(0, |f| f.priority);
            policy.awakened(id, priority);
            migrated += 1;
        }
        st.policy = policy;
        debug!(migrated, "scheduling policy replaced");
    }
}

impl std::fmt::Debug for SchedulerCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerCore").finish_non_exhaustive()
    }
}

/// A cooperative fiber scheduler bound to one host thread.
///
/// Create one per thread, [`install`](Self::install) it, and spawn fibers
/// through [`crate::fiber::Fiber`]. Dropping a scheduler while fibers are
/// still runnable or parked leaks their carriers; join or drain first.
#[derive(Debug, Clone)]
pub struct Scheduler {
    core: Arc<SchedulerCore>,
}

impl Scheduler {
    /// Creates a scheduler with the default round-robin policy and default
    /// configuration.
    #[must_use]
    pub fn new() -> Self {
        crate::runtime::builder::SchedulerBuilder::new().build()
    }

    /// Returns a builder for a customized scheduler.
    #[must_use]
    pub fn builder() -> crate::runtime::builder::SchedulerBuilder {
        crate::runtime::builder::SchedulerBuilder::new()
    }

    pub(crate) fn from_core(core: Arc<SchedulerCore>) -> Self {
        Self { core }
    }

    /// Installs this scheduler on the calling thread, returning a guard
    /// that restores the previous binding on drop.
    #[must_use]
    pub fn install(&self) -> InstallGuard {
        let prev = CURRENT.with(|c| {
            c.borrow_mut().replace(CurrentHandle {
                sched: Arc::clone(&self.core),
                fiber: FiberId::NONE,
            })
        });
        InstallGuard {
            prev,
            _not_send: PhantomData,
        }
    }

    /// Runs fibers until none are ready and none are sleeping.
    ///
    /// Fibers parked on never-signalled primitives are left parked.
    pub fn run(&self) {
        self.core.drain();
    }

    /// Performs at most one scheduling decision; returns whether a fiber ran.
    pub fn run_once(&self) -> bool {
        self.core.run_once()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores the thread's previous scheduler binding when dropped.
#[must_use = "dropping the guard immediately uninstalls the scheduler"]
pub struct InstallGuard {
    prev: Option<CurrentHandle>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for InstallGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT.with(|c| *c.borrow_mut() = prev);
    }
}

impl std::fmt::Debug for InstallGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallGuard").finish_non_exhaustive()
    }
}

/// Replaces the scheduling policy of the calling thread's installed
/// scheduler. Pending ready fibers migrate to the new policy.
///
/// # Errors
///
/// Fails with `NotInstalled` if the thread has no scheduler.
pub fn scheduling_algorithm(policy: Box<dyn SchedulingAlgorithm>) -> Result<()> {
    let cur = current_or_err()?;
    cur.sched.replace_policy(policy);
    Ok(())
}
