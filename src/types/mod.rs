//! Core types shared across the runtime.

pub mod id;
pub mod status;
pub mod time;

pub use id::FiberId;
pub use status::{FiberStatus, InterruptMode};
pub use time::Time;
