//! The monotonic time source behind every timed wait.
//!
//! The runtime measures time as [`Time`] — nanoseconds since a process-wide
//! origin captured on first use. Timed waits accept deadlines from arbitrary
//! clock types through the [`Clock`] trait: a foreign deadline is converted
//! by `monotonic_now + (deadline - foreign_clock.now())`, so drift between
//! clocks only affects the conversion instant, never the wait itself.

use crate::types::Time;
use std::sync::OnceLock;
use std::time::Instant;

static ORIGIN: OnceLock<Instant> = OnceLock::new();

fn origin() -> Instant {
    *ORIGIN.get_or_init(Instant::now)
}

/// Returns the current monotonic time.
#[must_use]
pub fn now() -> Time {
    let nanos = origin().elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
    Time::from_nanos(nanos)
}

/// Converts a monotonic [`Time`] back to the `Instant` it names.
///
/// Used by the scheduler to block the host thread until a deadline.
/// Deadlines past the platform's `Instant` range clamp to roughly a year
/// out, far beyond any wait the runtime re-examines anyway.
#[must_use]
pub(crate) fn instant_at(time: Time) -> Instant {
    let offset = time.saturating_duration_since(Time::ZERO);
    origin()
        .checked_add(offset)
        .unwrap_or_else(|| origin() + std::time::Duration::from_secs(365 * 24 * 3600))
}

/// A source of [`Time`] values.
///
/// The scheduler itself always runs on the monotonic source; this trait
/// exists so deadlines expressed against other clocks can be converted.
pub trait Clock {
    /// Returns the clock's current reading.
    fn now(&self) -> Time;
}

/// The process-wide monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Time {
        now()
    }
}

/// Converts a deadline on `clock`'s axis to the monotonic axis.
#[must_use]
pub fn to_monotonic<C: Clock>(clock: &C, deadline: Time) -> Time {
    now() + deadline.saturating_duration_since(clock.now())
}
