//! FIFO waiter bookkeeping shared by the fiber-aware primitives.
//!
//! A [`WaitList`] records who is parked on a primitive: fibers (by
//! identity and owning scheduler) and main-context waiters (identity
//! [`FiberId::NONE`], woken by kicking their scheduler's host thread).
//! Entries hold the strong scheduler reference; the fiber side keeps only
//! its token, resolved back here on wakeup, so no reference cycle forms.

use crate::context::Wake;
use crate::runtime::{CurrentHandle, SchedulerCore};
use crate::types::FiberId;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug)]
struct WaitEntry {
    token: u64,
    fiber: FiberId,
    sched: Arc<SchedulerCore>,
    notified: bool,
}

/// FIFO list of parked waiters.
#[derive(Debug, Default)]
pub(crate) struct WaitList {
    entries: VecDeque<WaitEntry>,
    next_token: u64,
}

impl WaitList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enrolls the calling context, returning its removal token.
    ///
    /// Fiber callers must have called `prepare_park` first, while still
    /// holding the primitive's lock around this enrollment.
    pub(crate) fn enroll(&mut self, cur: &CurrentHandle) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.entries.push_back(WaitEntry {
            token,
            fiber: cur.fiber,
            sched: Arc::clone(&cur.sched),
            notified: false,
        });
        token
    }

    /// Removes an entry by token; idempotent.
    pub(crate) fn remove(&mut self, token: u64) {
        if let Some(pos) = self.entries.iter().position(|e| e.token == token) {
            self.entries.remove(pos);
        }
    }

    /// Whether the entry was notified. Absent entries count as notified
    /// (the notifier removed them).
    pub(crate) fn is_notified(&self, token: u64) -> bool {
        self.entries
            .iter()
            .find(|e| e.token == token)
            .map_or(true, |e| e.notified)
    }

    /// Wakes the first waiter in FIFO order. Stale entries (fibers already
    /// woken by timeout or interruption) are dropped and skipped. Returns
    /// false if no live waiter remained.
    pub(crate) fn notify_one(&mut self) -> bool {
        while let Some(pos) = self.entries.iter().position(|e| !e.notified) {
            if self.entries[pos].fiber.is_none() {
                self.entries[pos].notified = true;
                self.entries[pos].sched.kick();
                return true;
            }
            let entry = self.entries.remove(pos).expect("position in bounds");
            if entry.sched.unpark(entry.fiber, Wake::Ready) {
                return true;
            }
        }
        false
    }

    /// Wakes every waiter in FIFO insertion order.
    pub(crate) fn notify_all(&mut self) {
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].notified {
                i += 1;
            } else if self.entries[i].fiber.is_none() {
                self.entries[i].notified = true;
                self.entries[i].sched.kick();
                i += 1;
            } else {
                let entry = self.entries.remove(i).expect("position in bounds");
                let _ = entry.sched.unpark(entry.fiber, Wake::Ready);
            }
        }
    }

    /// Returns the number of enrolled waiters.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
