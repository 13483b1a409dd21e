//! The deadline-ordered sleep queue.
//!
//! Holds fibers parked with a wakeup deadline: explicit sleepers and timed
//! waits racing a notification. Earliest deadline first; equal deadlines
//! keep insertion order.

use crate::types::{FiberId, Time};
use smallvec::SmallVec;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
struct SleepEntry {
    deadline: Time,
    fiber: FiberId,
}

/// The scheduler's sleep queue.
#[derive(Debug, Default)]
pub(crate) struct SleepQueue {
    entries: VecDeque<SleepEntry>,
}

impl SleepQueue {
    /// Enrolls a fiber with a wakeup deadline.
    pub(crate) fn insert(&mut self, deadline: Time, fiber: FiberId) {
        // Earlier deadline first. Stable for equal deadlines.
        let pos = self
            .entries
            .iter()
            .position(|e| deadline < e.deadline)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, SleepEntry { deadline, fiber });
    }

    /// Removes a fiber's entry, if enrolled.
    pub(crate) fn remove(&mut self, fiber: FiberId) {
        if let Some(pos) = self.entries.iter().position(|e| e.fiber == fiber) {
            self.entries.remove(pos);
        }
    }

    /// Returns the earliest pending deadline.
    pub(crate) fn earliest(&self) -> Option<Time> {
        self.entries.front().map(|e| e.deadline)
    }

    /// Removes and returns every fiber whose deadline has passed.
    pub(crate) fn pop_expired(&mut self, now: Time) -> SmallVec<[FiberId; 4]> {
        let mut expired = SmallVec::new();
        while let Some(front) = self.entries.front() {
            if front.deadline > now {
                break;
            }
            expired.push(self.entries.pop_front().map(|e| e.fiber).unwrap_or_default());
        }
        expired
    }

    /// Returns true if no fibers are sleeping.
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
