//! Identifier type for fibers.
//!
//! A [`FiberId`] names one fiber for the lifetime of the process. Identifiers
//! are totally ordered and hashable so they can key maps and sets, and the
//! distinguished [`FiberId::NONE`] value names "not a fiber": it is returned
//! by empty handles and by [`crate::this_fiber::id`] on the main context.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static FIBER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for a fiber.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FiberId(u64);

impl FiberId {
    /// The distinguished "not a fiber" identity.
    ///
    /// Equal to the identity of a default-constructed handle, and to the
    /// identity reported from the main context of a scheduler.
    pub const NONE: Self = Self(0);

    /// Allocates the next fresh fiber identity.
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(FIBER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns true if this is the distinguished none identity.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Creates a fiber ID for testing purposes.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "FiberId(none)")
        } else {
            write!(f, "FiberId({})", self.0)
        }
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "F-")
        } else {
            write!(f, "F{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_default() {
        assert_eq!(FiberId::default(), FiberId::NONE);
        assert!(FiberId::NONE.is_none());
    }

    #[test]
    fn fresh_ids_are_distinct_and_ordered() {
        let a = FiberId::next();
        let b = FiberId::next();
        assert_ne!(a, b);
        assert!(a < b);
        assert!(!a.is_none());
    }

    #[test]
    fn display_formats() {
        assert_eq!(FiberId::NONE.to_string(), "F-");
        assert_eq!(FiberId::new_for_test(7).to_string(), "F7");
    }
}
