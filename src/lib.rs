//! Filament: a stackful cooperative fiber runtime with promise/future
//! result handoff.
//!
//! # Overview
//!
//! A fiber is a stackful, cooperatively scheduled unit of execution,
//! multiplexed onto one host thread. The runtime switches between fibers
//! only at explicit suspension points — yield, sleep, blocking on a
//! fiber-aware primitive — never by preemption, so code between suspension
//! points runs atomically with respect to the other fibers of the same
//! scheduler.
//!
//! The promise/future facility lets one fiber (or an external producer
//! thread) deliver a single-shot value or failure to one or more waiting
//! fibers; an unready consumer parks and the scheduler runs another fiber
//! in its place.
//!
//! # Core Guarantees
//!
//! - **FIFO fairness**: within a priority level the default policy, the
//!   mutex, and every waiter set service in arrival order
//! - **No abandoned consumers**: dropping the last producer of an unready
//!   shared state delivers `broken_promise` to every waiter
//! - **Interruption is explicit**: a blocked fiber fails its call with
//!   `interrupted` only at declared points, and scoped disabling defers
//!   requests without dropping them
//! - **One scheduler per thread**: fibers run sequentially on the thread
//!   their scheduler is installed on; producer-side handoff calls may come
//!   from any thread
//!
//! # Module Structure
//!
//! - [`types`]: identifiers, timestamps, status machines
//! - [`error`]: error kinds and the crate-wide error type
//! - [`clock`]: the monotonic time source and foreign-clock conversion
//! - [`stack`]: the stack-allocator contract
//! - [`context`]: the symmetric context-switch primitive
//! - [`runtime`]: scheduler core, policy contract, builder
//! - [`fiber`]: fiber handles and spawning
//! - [`this_fiber`]: operations on the calling fiber
//! - [`sync`]: fiber-aware mutex, condition variable, one-shot event
//! - [`future`]: promise / future / shared-future / packaged task
//! - [`test_utils`]: logging and scheduler helpers for tests
//!
//! # Example
//!
//! ```
//! use filament::fiber::Fiber;
//! use filament::future::Promise;
//! use filament::runtime::Scheduler;
//!
//! let sched = Scheduler::new();
//! let _guard = sched.install();
//!
//! let mut promise = Promise::new();
//! let future = promise.get_future().unwrap();
//!
//! let mut consumer = Fiber::spawn(move || {
//!     assert_eq!(future.get().unwrap(), 42);
//! })
//! .unwrap();
//!
//! promise.set_value(42).unwrap();
//! consumer.join().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::module_inception)]

pub mod clock;
pub mod context;
pub mod error;
pub mod fiber;
pub mod future;
pub mod runtime;
pub mod stack;
pub mod sync;
pub mod test_utils;
pub mod this_fiber;
pub mod types;

// Re-exports for convenient access to core types
pub use error::{Error, ErrorKind, PanicPayload, Result, SpawnError};
pub use fiber::Fiber;
pub use future::{spawn_async, Future, FutureStatus, PackagedTask, Promise, SharedFuture};
pub use runtime::{scheduling_algorithm, RoundRobin, Scheduler, SchedulingAlgorithm};
pub use types::{FiberId, FiberStatus, Time};
