//! Interruption scenarios: delivery at interruption points, through
//! blocking primitives, and deferral under disabled scopes.

use filament::sync::{Event, Mutex};
use filament::test_utils::{init_test_logging, test_scheduler};
use filament::this_fiber;
use filament::{ErrorKind, Fiber, Promise};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// A pending request fires at the fiber's first interruption point; the
// guarded flag is never set.
#[test]
fn interrupts_at_interruption_point() {
    init_test_logging();
    filament::test_phase!("interrupts_at_interruption_point");
    let (_sched, _guard) = test_scheduler();

    let mutex = Arc::new(Mutex::new(()));
    let failed = Arc::new(AtomicBool::new(false));

    let held = mutex.lock().expect("main lock");
    let fiber_mutex = Arc::clone(&mutex);
    let fiber_failed = Arc::clone(&failed);
    let mut fiber = Fiber::spawn(move || {
        let Ok(_lk) = fiber_mutex.lock() else {
            return;
        };
        if this_fiber::interruption_point().is_err() {
            return;
        }
        fiber_failed.store(true, Ordering::SeqCst);
    })
    .expect("spawn");

    fiber.interrupt();
    drop(held);
    fiber.join().expect("join");
    assert!(!failed.load(Ordering::SeqCst));
    filament::test_complete!("interrupts_at_interruption_point");
}

// With interruption disabled, the same sequence runs to completion and
// the request stays pending.
#[test]
fn no_interrupt_when_disabled_at_interruption_point() {
    init_test_logging();
    filament::test_phase!("no_interrupt_when_disabled_at_interruption_point");
    let (_sched, _guard) = test_scheduler();

    let mutex = Arc::new(Mutex::new(()));
    let failed = Arc::new(AtomicBool::new(true));

    let held = mutex.lock().expect("main lock");
    let fiber_mutex = Arc::clone(&mutex);
    let fiber_failed = Arc::clone(&failed);
    let mut fiber = Fiber::spawn(move || {
        let _dc = this_fiber::disable_interruption();
        let _lk = fiber_mutex.lock().expect("lock proceeds while disabled");
        this_fiber::interruption_point().expect("no-op while disabled");
        fiber_failed.store(false, Ordering::SeqCst);
    })
    .expect("spawn");

    fiber.interrupt();
    drop(held);
    fiber.join().expect("join");
    assert!(!failed.load(Ordering::SeqCst));
    filament::test_complete!("no_interrupt_when_disabled_at_interruption_point");
}

// Fiber A holds the mutex, fiber B parks on it, B is interrupted, then A
// releases: B's lock call fails and B never acquires the mutex.
#[test]
fn interruption_through_mutex_wait() {
    init_test_logging();
    filament::test_phase!("interruption_through_mutex_wait");
    let (sched, _guard) = test_scheduler();

    let mutex = Arc::new(Mutex::new(0_u32));
    let release = Arc::new(Event::new());
    let b_outcome = Arc::new(AtomicUsize::new(0));

    let a_mutex = Arc::clone(&mutex);
    let a_release = Arc::clone(&release);
    let mut fiber_a = Fiber::spawn(move || {
        let mut lk = a_mutex.lock().expect("A acquires first");
        a_release.wait().expect("hold until released");
        *lk += 1;
    })
    .expect("spawn A");

    let b_mutex = Arc::clone(&mutex);
    let b_flag = Arc::clone(&b_outcome);
    let mut fiber_b = Fiber::spawn(move || {
        match b_mutex.lock() {
            Ok(_) => b_flag.store(2, Ordering::SeqCst),
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                b_flag.store(1, Ordering::SeqCst);
            }
            Err(_) => b_flag.store(3, Ordering::SeqCst),
        }
    })
    .expect("spawn B");

    // A acquires and parks on the event; B parks on the mutex.
    assert!(sched.run_once());
    assert!(sched.run_once());
    assert!(mutex.is_locked());

    fiber_b.interrupt();
    release.set();
    fiber_a.join().expect("join A");
    fiber_b.join().expect("join B");

    filament::assert_with_log!(
        b_outcome.load(Ordering::SeqCst) == 1,
        "B's lock call failed with interrupted",
        1_usize,
        b_outcome.load(Ordering::SeqCst)
    );
    assert!(!mutex.is_locked());
    filament::test_complete!("interruption_through_mutex_wait");
}

// Interruption fails a future wait; the delivered value is not lost.
#[test]
fn interruption_through_future_wait() {
    let (sched, _guard) = test_scheduler();

    let mut promise: Promise<u32> = Promise::new();
    let future = promise.get_future().expect("get_future");
    let outcome = Arc::new(AtomicUsize::new(0));

    let fiber_outcome = Arc::clone(&outcome);
    let mut consumer = Fiber::spawn(move || {
        match future.wait() {
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                fiber_outcome.store(1, Ordering::SeqCst);
            }
            other => {
                let _ = other;
                fiber_outcome.store(2, Ordering::SeqCst);
            }
        }
    })
    .expect("spawn");

    assert!(sched.run_once());
    consumer.interrupt();
    consumer.join().expect("join");
    assert_eq!(outcome.load(Ordering::SeqCst), 1);

    // The state still accepts and holds the value for other consumers.
    promise.set_value(5).expect("set_value");
}

// Interruption cuts a sleep short.
#[test]
fn interruption_through_sleep() {
    let (sched, _guard) = test_scheduler();

    let outcome = Arc::new(AtomicUsize::new(0));
    let fiber_outcome = Arc::clone(&outcome);
    let started = Instant::now();

    let mut sleeper = Fiber::spawn(move || {
        match this_fiber::sleep_for(Duration::from_secs(10)) {
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                fiber_outcome.store(1, Ordering::SeqCst);
            }
            _ => fiber_outcome.store(2, Ordering::SeqCst),
        }
    })
    .expect("spawn");

    assert!(sched.run_once());
    sleeper.interrupt();
    sleeper.join().expect("join");

    assert_eq!(outcome.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

// A request delivered inside a disabled scope stays pending and fires at
// the first interruption point after the scope ends.
#[test]
fn disabled_scope_defers_request() {
    init_test_logging();
    filament::test_phase!("disabled_scope_defers_request");
    let (sched, _guard) = test_scheduler();

    let gate = Arc::new(Event::new());
    let outcome = Arc::new(AtomicUsize::new(0));

    let fiber_gate = Arc::clone(&gate);
    let fiber_outcome = Arc::clone(&outcome);
    let mut fiber = Fiber::spawn(move || {
        {
            let _dc = this_fiber::disable_interruption();
            // Parked with interruption disabled: the request must not
            // wake or fail this wait.
            fiber_gate.wait().expect("wait survives disabled interrupt");
            assert!(this_fiber::interruption_requested());
        }
        // Scope ended: the deferred request fires here.
        match this_fiber::interruption_point() {
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                fiber_outcome.store(1, Ordering::SeqCst);
            }
            _ => fiber_outcome.store(2, Ordering::SeqCst),
        }
    })
    .expect("spawn");

    assert!(sched.run_once());
    fiber.interrupt();
    // The fiber must still be parked: delivery was deferred.
    assert!(!sched.run_once());

    gate.set();
    fiber.join().expect("join");
    assert_eq!(outcome.load(Ordering::SeqCst), 1);
    filament::test_complete!("disabled_scope_defers_request");
}

// Nested disabled scopes restore the outer state on exit.
#[test]
fn disable_interruption_scopes_nest() {
    let (_sched, _guard) = test_scheduler();

    let outcome = Arc::new(AtomicUsize::new(0));
    let fiber_outcome = Arc::clone(&outcome);
    let mut fiber = Fiber::spawn(move || {
        let outer = this_fiber::disable_interruption();
        {
            let _inner = this_fiber::disable_interruption();
            this_fiber::interruption_point().expect("disabled by inner");
        }
        // Outer scope still active after the inner guard dropped.
        this_fiber::interruption_point().expect("disabled by outer");
        drop(outer);
        match this_fiber::interruption_point() {
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                fiber_outcome.store(1, Ordering::SeqCst);
            }
            _ => fiber_outcome.store(2, Ordering::SeqCst),
        }
    })
    .expect("spawn");

    fiber.interrupt();
    fiber.join().expect("join");
    assert_eq!(outcome.load(Ordering::SeqCst), 1);
}

// cancel() is an alias for interrupt().
#[test]
fn cancel_aliases_interrupt() {
    let (sched, _guard) = test_scheduler();

    let outcome = Arc::new(AtomicUsize::new(0));
    let fiber_outcome = Arc::clone(&outcome);
    let mut fiber = Fiber::spawn(move || {
        if this_fiber::sleep_for(Duration::from_secs(10)).is_err() {
            fiber_outcome.store(1, Ordering::SeqCst);
        }
    })
    .expect("spawn");

    assert!(sched.run_once());
    fiber.cancel();
    fiber.join().expect("join");
    assert_eq!(outcome.load(Ordering::SeqCst), 1);
}

// Interrupting the joining fiber fails the join; the target keeps
// running and the handle stays joinable.
#[test]
fn interruption_through_join() {
    let (sched, _guard) = test_scheduler();

    let gate = Arc::new(Event::new());
    let outcome = Arc::new(AtomicUsize::new(0));

    let target_gate = Arc::clone(&gate);
    let target = Fiber::spawn(move || {
        target_gate.wait().expect("wait for gate");
    })
    .expect("spawn target");
    let target_slot = Arc::new(std::sync::Mutex::new(Some(target)));

    let joiner_slot = Arc::clone(&target_slot);
    let joiner_outcome = Arc::clone(&outcome);
    let mut joiner = Fiber::spawn(move || {
        let mut target = joiner_slot
            .lock()
            .expect("slot")
            .take()
            .expect("target handle");
        match target.join() {
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                assert!(target.joinable(), "interrupted join keeps ownership");
                joiner_outcome.store(1, Ordering::SeqCst);
            }
            _ => joiner_outcome.store(2, Ordering::SeqCst),
        }
        joiner_slot.lock().expect("slot").replace(target);
    })
    .expect("spawn joiner");

    // Target parks on the gate; joiner parks on the target.
    assert!(sched.run_once());
    assert!(sched.run_once());

    joiner.interrupt();
    joiner.join().expect("join joiner");
    assert_eq!(outcome.load(Ordering::SeqCst), 1);

    gate.set();
    let mut target = target_slot
        .lock()
        .expect("slot")
        .take()
        .expect("target back");
    target.join().expect("join target after gate");
}
