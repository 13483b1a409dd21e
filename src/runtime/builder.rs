//! Scheduler builder and configuration.

use crate::runtime::algorithm::{RoundRobin, SchedulingAlgorithm};
use crate::runtime::scheduler::{Scheduler, SchedulerCore};
use crate::stack::{DefaultStackAllocator, DEFAULT_STACK_SIZE};
use std::sync::Arc;

/// Resolved scheduler configuration.
#[derive(Debug, Clone)]
pub(crate) struct SchedulerConfig {
    pub(crate) allocator: DefaultStackAllocator,
    pub(crate) name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            allocator: DefaultStackAllocator::default(),
            name_prefix: "filament".to_owned(),
        }
    }
}

/// Builder for constructing a [`Scheduler`] with custom configuration.
#[must_use]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    policy: Option<Box<dyn SchedulingAlgorithm>>,
}

impl SchedulerBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            policy: None,
        }
    }

    /// Sets the default fiber stack size in bytes.
    ///
    /// The `FILAMENT_STACK_SIZE` environment variable overrides this.
    pub fn default_stack_size(mut self, size: usize) -> Self {
        self.config.allocator = DefaultStackAllocator::new(size.max(1));
        self
    }

    /// Sets the carrier name prefix for unnamed fibers.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.name_prefix = prefix.into();
        self
    }

    /// Sets the scheduling policy. Defaults to [`RoundRobin`].
    pub fn policy(mut self, policy: Box<dyn SchedulingAlgorithm>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Builds the scheduler.
    pub fn build(self) -> Scheduler {
        let policy = self
            .policy
            .unwrap_or_else(|| Box::new(RoundRobin::new()));
        Scheduler::from_core(Arc::new(SchedulerCore::new(self.config, policy)))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{StackAllocator, MIN_STACK_SIZE};

    #[test]
    fn default_config_uses_default_stack() {
        let config = SchedulerConfig::default();
        assert!(config.allocator.allocate(0).size() >= MIN_STACK_SIZE);
        assert_eq!(config.name_prefix, "filament");
    }

    #[test]
    fn builder_overrides_are_applied() {
        let sched = SchedulerBuilder::new()
            .default_stack_size(DEFAULT_STACK_SIZE * 2)
            .name_prefix("test-fibers")
            .build();
        // Building succeeds with a custom policy too.
        let _ = sched;
        let sched = SchedulerBuilder::new()
            .policy(Box::new(RoundRobin::new()))
            .build();
        let _ = sched;
    }
}
