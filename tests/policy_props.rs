//! Property tests for the default scheduling policy.

use filament::{FiberId, RoundRobin, SchedulingAlgorithm};
use proptest::prelude::*;

fn fiber(n: u64) -> FiberId {
    FiberId::new_for_test(n + 1)
}

proptest! {
    // With one priority level the policy is a pure FIFO queue.
    #[test]
    fn equal_priority_is_fifo(count in 1_u64..32) {
        let mut rr = RoundRobin::new();
        for n in 0..count {
            rr.awakened(fiber(n), 0);
        }
        for n in 0..count {
            prop_assert_eq!(rr.pick_next(), Some(fiber(n)));
        }
        prop_assert_eq!(rr.pick_next(), None);
    }

    // Every awakened fiber is eventually picked exactly once.
    #[test]
    fn no_fiber_is_lost_or_duplicated(count in 1_u64..32) {
        let mut rr = RoundRobin::new();
        for n in 0..count {
            rr.awakened(fiber(n), (n % 3) as i32);
        }
        let mut picked = std::collections::HashSet::new();
        while let Some(id) = rr.pick_next() {
            prop_assert!(picked.insert(id), "fiber picked twice: {id}");
        }
        prop_assert_eq!(picked.len() as u64, count);
    }

    // After a priority change, the changed fiber precedes every ready
    // fiber of strictly lower priority.
    #[test]
    fn priority_change_precedes_lower_priorities(
        count in 2_u64..16,
        chosen in 0_u64..16,
        priority in 1_i32..100,
    ) {
        let chosen = chosen % count;
        let mut rr = RoundRobin::new();
        for n in 0..count {
            rr.awakened(fiber(n), 0);
        }
        rr.priority_changed(fiber(chosen), priority);

        let mut order = Vec::new();
        while let Some(id) = rr.pick_next() {
            order.push(id);
        }
        let chosen_pos = order.iter().position(|&id| id == fiber(chosen)).unwrap();
        prop_assert_eq!(chosen_pos, 0, "raised fiber must run before priority-0 fibers");
        prop_assert_eq!(order.len() as u64, count);
    }

    // Ties keep insertion order: raising several fibers to one priority
    // preserves the order the raises happened in.
    #[test]
    fn priority_ties_keep_raise_order(count in 3_u64..12) {
        let mut rr = RoundRobin::new();
        for n in 0..count {
            rr.awakened(fiber(n), 0);
        }
        // Raise the last two fibers, in reverse spawn order.
        rr.priority_changed(fiber(count - 1), 5);
        rr.priority_changed(fiber(count - 2), 5);

        prop_assert_eq!(rr.pick_next(), Some(fiber(count - 1)));
        prop_assert_eq!(rr.pick_next(), Some(fiber(count - 2)));
    }
}
