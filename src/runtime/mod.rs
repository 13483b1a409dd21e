//! Scheduler core: run loop, policy hook, sleep queue, and installation.

pub mod algorithm;
pub mod builder;
pub mod scheduler;
mod sleep_queue;

pub use algorithm::{RoundRobin, SchedulingAlgorithm};
pub use builder::SchedulerBuilder;
pub use scheduler::{scheduling_algorithm, InstallGuard, Scheduler};

pub(crate) use scheduler::{current, current_or_err, CurrentHandle, SchedulerCore};
