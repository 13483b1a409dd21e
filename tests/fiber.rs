//! Fiber lifecycle scenarios: spawn, move, join, detach, yield, priority.

use filament::test_utils::{init_test_logging, test_scheduler};
use filament::this_fiber;
use filament::{scheduling_algorithm, ErrorKind, Fiber, FiberId, RoundRobin};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

#[test]
fn empty_handle_properties() {
    init_test_logging();
    filament::test_phase!("empty_handle_properties");

    let mut fiber = Fiber::empty();
    assert!(fiber.is_empty());
    assert!(!fiber.joinable());
    assert!(!fiber.is_running());
    assert_eq!(fiber.id(), FiberId::NONE);
    assert_eq!(fiber.priority(), 0);

    let err = fiber.join().expect_err("empty handle is not joinable");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    filament::test_complete!("empty_handle_properties");
}

#[test]
fn moved_handle_keeps_identity() {
    let (_sched, _guard) = test_scheduler();

    let fiber = Fiber::spawn(|| {}).expect("spawn");
    assert!(fiber.joinable());
    let id = fiber.id();
    assert_ne!(id, FiberId::NONE);

    // Move the handle; ownership and identity travel with it.
    let mut moved = fiber;
    assert!(moved.joinable());
    assert_eq!(moved.id(), id);
    moved.join().expect("join");
    assert!(!moved.joinable());
    assert_eq!(moved.id(), FiberId::NONE);
}

#[test]
fn spawned_fibers_have_distinct_ids() {
    let (_sched, _guard) = test_scheduler();

    let mut a = Fiber::spawn(|| {}).expect("spawn");
    let mut b = Fiber::spawn(|| {}).expect("spawn");
    assert_ne!(a.id(), b.id());
    assert_ne!(a.id(), FiberId::NONE);

    a.join().expect("join a");
    b.join().expect("join b");
}

#[test]
fn priority_roundtrip() {
    let (_sched, _guard) = test_scheduler();

    let mut fiber = Fiber::spawn(|| {}).expect("spawn");
    assert_eq!(fiber.priority(), 0);
    fiber.set_priority(7);
    assert_eq!(fiber.priority(), 7);
    fiber.join().expect("join");
}

#[test]
fn detach_clears_ownership() {
    let (sched, _guard) = test_scheduler();

    let mut quick = Fiber::spawn(|| {}).expect("spawn");
    quick.detach();
    assert!(!quick.joinable());

    let mut yielding = Fiber::spawn(|| {
        this_fiber::yield_now();
    })
    .expect("spawn");
    assert!(yielding.is_running());
    yielding.detach();
    assert!(!yielding.joinable());

    // Detached fibers still run to completion.
    sched.run();
}

#[test]
fn join_clears_handle() {
    let (_sched, _guard) = test_scheduler();

    let mut fiber = Fiber::spawn(|| {
        this_fiber::yield_now();
    })
    .expect("spawn");
    assert!(fiber.is_running());
    assert!(fiber.joinable());
    fiber.join().expect("join");
    assert!(!fiber.joinable());
    assert!(!fiber.is_running());
}

#[test]
fn join_terminated_fiber_does_not_block() {
    let (sched, _guard) = test_scheduler();

    let mut fiber = Fiber::spawn(|| {}).expect("spawn");
    // Run the fiber to completion before joining.
    sched.run();
    fiber.join().expect("join of terminated fiber returns at once");
}

#[test]
fn join_inside_fiber() {
    let (_sched, _guard) = test_scheduler();

    let mut outer = Fiber::spawn(|| {
        let mut inner = Fiber::spawn(|| {
            this_fiber::yield_now();
        })
        .expect("inner spawn");
        assert_ne!(inner.id(), this_fiber::id());
        inner.join().expect("inner join");
    })
    .expect("outer spawn");
    outer.join().expect("outer join");
}

#[test]
fn self_join_is_resource_deadlock() {
    let (sched, _guard) = test_scheduler();

    let slot: Arc<StdMutex<Option<Fiber>>> = Arc::new(StdMutex::new(None));
    let fiber_slot = Arc::clone(&slot);
    let observed = Arc::new(StdMutex::new(None));
    let fiber_observed = Arc::clone(&observed);

    let fiber = Fiber::spawn(move || {
        let mut handle = fiber_slot
            .lock()
            .expect("slot lock")
            .take()
            .expect("handle stored before fiber runs");
        let err = handle.join().expect_err("self-join must fail");
        *fiber_observed.lock().expect("observed lock") = Some(err.kind());
        fiber_slot.lock().expect("slot lock").replace(handle);
    })
    .expect("spawn");

    slot.lock().expect("slot lock").replace(fiber);
    sched.run();

    assert_eq!(
        observed.lock().expect("observed lock").take(),
        Some(ErrorKind::ResourceDeadlock)
    );
    let mut handle = slot.lock().expect("slot lock").take().expect("handle back");
    handle.join().expect("join after termination");
}

#[test]
#[should_panic(expected = "joinable fiber dropped")]
fn dropping_joinable_handle_panics() {
    let (_sched, _guard) = test_scheduler();
    let _fiber = Fiber::spawn(|| {}).expect("spawn");
    // Dropped without join or detach.
}

#[test]
fn yield_break_terminates_cleanly() {
    let (_sched, _guard) = test_scheduler();

    let reached = Arc::new(AtomicI32::new(0));
    let fiber_reached = Arc::clone(&reached);
    let mut fiber = Fiber::spawn(move || {
        fiber_reached.store(1, Ordering::SeqCst);
        this_fiber::yield_break();
    })
    .expect("spawn");

    fiber.join().expect("yield_break is a clean exit");
    assert_eq!(reached.load(Ordering::SeqCst), 1);
}

#[test]
fn panicking_fiber_reports_on_join() {
    let (_sched, _guard) = test_scheduler();

    let mut fiber = Fiber::spawn(|| {
        panic!("deliberate failure");
    })
    .expect("spawn");

    let err = fiber.join().expect_err("panic surfaces at join");
    assert_eq!(err.kind(), ErrorKind::FiberPanicked);
    assert!(err.to_string().contains("deliberate failure"));
    assert!(!fiber.joinable());
}

// The yield-fibonacci scenario: both fibers interleave through the same
// sequence and land on 8.
#[test]
fn yield_fibonacci() {
    init_test_logging();
    filament::test_phase!("yield_fibonacci");
    let (_sched, _guard) = test_scheduler();

    fn fib_steps(cell: &AtomicI32) {
        for value in [1, 1, 2, 3, 5] {
            cell.store(value, Ordering::SeqCst);
            this_fiber::yield_now();
        }
        cell.store(8, Ordering::SeqCst);
    }

    let v1 = Arc::new(AtomicI32::new(0));
    let v2 = Arc::new(AtomicI32::new(0));
    let c1 = Arc::clone(&v1);
    let c2 = Arc::clone(&v2);

    let mut s1 = Fiber::spawn(move || fib_steps(&c1)).expect("spawn s1");
    let mut s2 = Fiber::spawn(move || fib_steps(&c2)).expect("spawn s2");
    s1.join().expect("join s1");
    s2.join().expect("join s2");

    filament::assert_with_log!(
        v1.load(Ordering::SeqCst) == 8,
        "first fiber finished the sequence",
        8,
        v1.load(Ordering::SeqCst)
    );
    filament::assert_with_log!(
        v2.load(Ordering::SeqCst) == 8,
        "second fiber finished the sequence",
        8,
        v2.load(Ordering::SeqCst)
    );
    filament::test_complete!("yield_fibonacci");
}

// Equal-priority fibers yield in strict alternation, starting with the
// first spawned.
#[test]
fn equal_priority_yield_alternation() {
    let (_sched, _guard) = test_scheduler();

    let order: Arc<StdMutex<Vec<char>>> = Arc::new(StdMutex::new(Vec::new()));

    let mut fibers = Vec::new();
    for tag in ['a', 'b'] {
        let order = Arc::clone(&order);
        fibers.push(
            Fiber::spawn(move || {
                for _ in 0..3 {
                    order.lock().expect("order lock").push(tag);
                    this_fiber::yield_now();
                }
            })
            .expect("spawn"),
        );
    }
    for fiber in &mut fibers {
        fiber.join().expect("join");
    }

    assert_eq!(
        *order.lock().expect("order lock"),
        vec!['a', 'b', 'a', 'b', 'a', 'b']
    );
}

// Raising one fiber's priority lets it run first; thereafter yields cycle
// round-robin.
#[test]
fn priority_orders_first_pick_then_alternates() {
    init_test_logging();
    filament::test_phase!("priority_orders_first_pick_then_alternates");
    let (_sched, _guard) = test_scheduler();

    let order: Arc<StdMutex<Vec<char>>> = Arc::new(StdMutex::new(Vec::new()));

    let spawn_tagged = |tag: char| {
        let order = Arc::clone(&order);
        Fiber::spawn(move || {
            for _ in 0..3 {
                order.lock().expect("order lock").push(tag);
                this_fiber::yield_now();
            }
        })
        .expect("spawn")
    };

    let mut f1 = spawn_tagged('1');
    let mut f2 = spawn_tagged('2');
    f2.set_priority(7);

    f1.join().expect("join f1");
    f2.join().expect("join f2");

    filament::assert_with_log!(
        *order.lock().expect("order lock") == vec!['2', '1', '2', '1', '2', '1'],
        "priority picks f2 first, then round-robin alternation",
        "212121",
        order
            .lock()
            .expect("order lock")
            .iter()
            .collect::<String>()
    );
    filament::test_complete!("priority_orders_first_pick_then_alternates");
}

// Replacing the scheduling policy migrates pending ready fibers.
#[test]
fn policy_replacement_migrates_ready_fibers() {
    let (_sched, _guard) = test_scheduler();

    let mut s1 = Fiber::spawn(|| {}).expect("spawn s1");
    let mut s2 = Fiber::spawn(|| {
        this_fiber::yield_now();
    })
    .expect("spawn s2");

    scheduling_algorithm(Box::new(RoundRobin::new())).expect("replace policy");

    s1.join().expect("join s1 under new policy");
    s2.join().expect("join s2 under new policy");
}

#[test]
fn builder_configures_name_stack_and_priority() {
    let (_sched, _guard) = test_scheduler();

    let mut fiber = Fiber::builder()
        .name("worker")
        .stack_size(256 * 1024)
        .priority(3)
        .spawn(|| {
            this_fiber::yield_now();
        })
        .expect("spawn");
    assert_eq!(fiber.priority(), 3);
    fiber.join().expect("join");
}

#[test]
fn spawn_without_scheduler_fails() {
    init_test_logging();
    let err = Fiber::spawn(|| {}).expect_err("no scheduler installed");
    assert!(matches!(err, filament::SpawnError::NotInstalled));
}

#[test]
fn this_fiber_id_inside_and_outside() {
    let (_sched, _guard) = test_scheduler();

    assert_eq!(this_fiber::id(), FiberId::NONE);

    let observed = Arc::new(StdMutex::new(FiberId::NONE));
    let fiber_observed = Arc::clone(&observed);
    let mut fiber = Fiber::spawn(move || {
        *fiber_observed.lock().expect("observed lock") = this_fiber::id();
    })
    .expect("spawn");
    let id = fiber.id();
    fiber.join().expect("join");

    assert_eq!(*observed.lock().expect("observed lock"), id);
}
